//! Error types for the harness.
//!
//! Construction failures and misuse propagate as [`HarnessError`]. Steady-state
//! queries that are routinely used in assertions (global variables, optional
//! content) degrade to empty results instead and never reach this type.

use std::time::Duration;

/// Harness error types.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Failed to create tmux session '{session}': {reason}")]
    SessionCreationFailed { session: String, reason: String },
    #[error("Session not started (no attached PTY)")]
    NotStarted,
    #[error("Failed to split window: {0}")]
    SplitFailed(String),
    #[error("tmux {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("tmux {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("Unexpected output from tmux {command}: {output:?}")]
    UnexpectedOutput { command: String, output: String },
    #[error("Pattern {pattern:?} not seen within {timeout:?}")]
    PatternNotFound { pattern: String, timeout: Duration },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("PTY error: {0}")]
    Pty(#[from] expectrl::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
