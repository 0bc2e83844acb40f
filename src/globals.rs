//! Server-wide tmux global variables.
//!
//! User options such as `@help_pane_id` live on the tmux server, not on a
//! session, so every session on the server sees and can clobber them. The
//! harness does not lock them: tests touching the same key must be serialized
//! by the test runner (the integration tests use `serial_test`).

/// Pane id of the help pane, maintained by the help-toggle binding.
pub const HELP_PANE_ID: &str = "@help_pane_id";

/// Variables cleared on every session teardown.
pub const HARNESS_GLOBALS: &[&str] = &[HELP_PANE_ID];

/// Whether a global variable value means "unset".
///
/// Scripts under test use either the empty string or `"0"` as their sentinel.
pub fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "0"
}
