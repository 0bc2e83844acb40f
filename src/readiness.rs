//! Shell readiness detection for freshly created sessions.
//!
//! A detached session reports "exists" long before the shell inside it reads
//! input. The probe types `echo <marker>` through the control channel and waits
//! for the marker to show up as command *output*, not just as typed text.
//! Some shells and configs never print it; the probe then gives up quietly.

use crate::control::TmuxControl;
use crate::error::Result;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

/// What the probe needs from a session: type a command line, read the screen.
pub trait ShellChannel {
    /// Type `text` and press Enter.
    fn send_line(&self, text: &str) -> Result<()>;
    /// Visible pane content, without scrollback.
    fn capture_visible(&self) -> Result<String>;
}

/// [`ShellChannel`] over the tmux control channel for one target.
#[derive(Debug)]
pub struct TmuxShellChannel<'a> {
    control: &'a TmuxControl,
    target: &'a str,
}

impl<'a> TmuxShellChannel<'a> {
    pub fn new(control: &'a TmuxControl, target: &'a str) -> Self {
        Self { control, target }
    }
}

impl ShellChannel for TmuxShellChannel<'_> {
    fn send_line(&self, text: &str) -> Result<()> {
        self.control.send_keys(self.target, &[text, "C-m"])
    }

    fn capture_visible(&self) -> Result<String> {
        self.control.capture_pane(self.target, None)
    }
}

/// Marker unique to this process, so concurrent harnesses never see each other's.
pub fn process_marker() -> String {
    format!("__READY_{}__", std::process::id())
}

/// Whether `line` shows the marker as executed output rather than the typed command.
pub fn marker_executed(line: &str, marker: &str) -> bool {
    line.contains(marker) && !line.contains(&format!("echo {marker}"))
}

#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub marker: String,
    pub max_attempts: u32,
    /// Wait between sending the echo and capturing the pane.
    pub settle: Duration,
    /// Wait between attempts.
    pub interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            marker: process_marker(),
            max_attempts: 10,
            settle: Duration::from_millis(150),
            interval: Duration::from_millis(100),
        }
    }
}

impl ReadinessProbe {
    /// Probe until the shell runs the echo or attempts run out.
    ///
    /// Returns whether readiness was confirmed. Exhaustion is not an error.
    pub fn run(&self, shell: &impl ShellChannel) -> bool {
        let command = format!("echo {}", self.marker);
        for attempt in 1..=self.max_attempts {
            if let Err(e) = shell.send_line(&command) {
                debug!(attempt, error = %e, "readiness echo not delivered");
            }
            sleep(self.settle);

            let screen = shell.capture_visible().unwrap_or_default();
            if screen.lines().any(|line| marker_executed(line, &self.marker)) {
                debug!(attempt, "shell ready");
                if let Err(e) = shell.send_line("clear") {
                    debug!(error = %e, "failed to clear readiness marker");
                }
                sleep(self.interval);
                return true;
            }

            sleep(self.interval);
        }
        warn!(
            attempts = self.max_attempts,
            "shell readiness not confirmed, continuing anyway"
        );
        false
    }
}
