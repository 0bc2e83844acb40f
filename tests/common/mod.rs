//! Common test utilities shared across integration tests.
//!
//! Every test here talks to a real tmux server. When `tmux` is not on PATH the
//! tests print a note and return early instead of failing.
//!
//! # Running Tests
//!
//! ```bash
//! # Tests that only need tmux
//! cargo test --test session_tests -- --nocapture
//!
//! # Tests that also need a ~/.tmux.conf with the help-pane binding
//! cargo test --test scenario_tests -- --include-ignored --nocapture
//! ```

use muxprobe::{ConfigSource, HarnessConfig, SessionOptions, logging};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for pane and text waits in tests.
#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(3);

/// True when tmux can be run. Prints the reason the caller is skipping otherwise.
pub fn tmux_or_skip() -> bool {
    if muxprobe::tmux_available("tmux") {
        return true;
    }
    eprintln!("Skipping test: tmux not found on PATH");
    false
}

/// True when `program` can be spawned.
#[allow(dead_code)]
pub fn program_or_skip(program: &str) -> bool {
    let found = std::process::Command::new(program)
        .arg("-c")
        .arg("exit 0")
        .output()
        .is_ok();
    if !found {
        eprintln!("Skipping test: {program} not found on PATH");
    }
    found
}

/// Harness settings with short waits so failing tests fail quickly.
#[allow(dead_code)]
pub fn test_config() -> HarnessConfig {
    HarnessConfig {
        timeout_secs: 5,
        poll_interval_ms: 50,
        readiness_attempts: 20,
        socket_dir: Some(std::env::temp_dir().join("muxprobe-tests")),
        ..HarnessConfig::default()
    }
}

/// Options for a session with no tmux config and the test settings.
#[allow(dead_code)]
pub fn minimal_options() -> SessionOptions {
    SessionOptions::new(ConfigSource::Empty).with_harness_config(test_config())
}

/// A no-op output sink for tests.
pub struct TestSink;

impl logging::OutputSink for TestSink {
    fn emit(&self, _message: &str) {
        // No-op for tests
    }
}

/// Initialize logging with a no-op sink for tests.
#[allow(dead_code)]
pub fn init_test_logging() {
    logging::set_output_sink(Arc::new(TestSink));
}
