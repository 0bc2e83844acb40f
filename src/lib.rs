//! muxprobe - drive real tmux sessions and PTYs to test interactive shell behavior.
//!
//! Keybindings, completions and prompt widgets are checked end-to-end: a real
//! tmux session is created, real keystroke bytes are written to its PTY, and
//! outcomes are read back through tmux's own control commands. Nothing is
//! mocked on the system under test.
//!
//! The binary crate (main.rs) uses these same modules.

pub mod config;
pub mod control;
pub mod error;
pub mod fixture;
pub mod globals;
pub mod injector;
pub mod keys;
pub mod logging;
pub mod polling;
pub mod readiness;
pub mod scenario;
pub mod session;
pub mod shell;
pub mod shell_fn;

// Re-export commonly used types
pub use config::{ConfigSource, HarnessConfig};
pub use control::{PaneId, PaneTarget, SplitAxis, TmuxControl, tmux_available};
pub use error::{HarnessError, Result};
pub use fixture::SessionFixture;
pub use logging::{OutputSink, log_event, set_output_sink};
pub use session::{SessionOptions, SessionState, TmuxSession};
