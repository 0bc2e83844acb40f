//! Out-of-band tmux control channel.
//!
//! Every query or mutation of a session (other than raw keystrokes) is a
//! separate `tmux <verb> ...` invocation: exit status 0 means success, stdout
//! carries the answer. [`TmuxControl`] wraps that text protocol in typed
//! accessors so callers get `Vec<PaneId>` or `u16` instead of strings.
//!
//! The [`CommandRunner`] trait is the seam between the typed layer and the
//! process that actually runs tmux, which lets unit tests script responses.

use crate::error::{HarnessError, Result};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Result of one control-channel invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs one tmux invocation and reports its outcome.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs the real tmux binary as a subprocess.
#[derive(Debug, Clone)]
pub struct TmuxCommand {
    binary: String,
}

impl TmuxCommand {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TmuxCommand {
    fn default() -> Self {
        Self::new("tmux")
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Run `command` to completion, draining its output, or fail after `timeout`.
///
/// The deadline covers both the exit and the end of output: a background job
/// that inherited the pipes cannot hold the call open past `timeout`. On
/// timeout the child is left running; only session teardown kills anything.
pub(crate) fn run_with_timeout(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<(ExitStatus, String, String)> {
    let deadline = Instant::now() + timeout;
    let timed_out = || HarnessError::Timeout {
        command: label.to_string(),
        timeout,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drained on separate threads: a 1000-line capture overflows the pipe buffer.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
        thread::spawn(move || {
            let _ = child.wait();
        });
        return Err(timed_out());
    };

    let collect = |rx: mpsc::Receiver<String>| {
        rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| timed_out())
    };
    let stdout = collect(stdout)?;
    let stderr = collect(stderr)?;
    Ok((status, stdout, stderr))
}

impl CommandRunner for TmuxCommand {
    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let (status, stdout, stderr) = run_with_timeout(command, verb(&words), timeout)?;
        Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr,
        })
    }
}

/// Opaque tmux pane handle of the shape `%<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaneId(String);

impl PaneId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PaneId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix('%') {
            Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                Ok(Self(s.to_string()))
            }
            _ => Err(format!("not a pane id: {s:?}")),
        }
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Side by side (`split-window -h`).
    Horizontal,
    /// Stacked (`split-window -v`).
    Vertical,
}

impl SplitAxis {
    fn flag(self) -> &'static str {
        match self {
            Self::Horizontal => "-h",
            Self::Vertical => "-v",
        }
    }
}

/// A pane addressed either by its id or by its index in the active window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneTarget {
    Id(PaneId),
    Index(u32),
}

impl PaneTarget {
    /// tmux `-t` argument for this pane within `session`.
    pub fn resolve(&self, session: &str) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Index(index) => format!("{session}:.{index}"),
        }
    }
}

impl From<PaneId> for PaneTarget {
    fn from(id: PaneId) -> Self {
        Self::Id(id)
    }
}

impl From<&PaneId> for PaneTarget {
    fn from(id: &PaneId) -> Self {
        Self::Id(id.clone())
    }
}

/// Parse `list-panes -F '#{pane_id}'` output.
pub fn parse_pane_ids(stdout: &str) -> std::result::Result<Vec<PaneId>, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PaneId::from_str)
        .collect()
}

/// The tmux verb of an argument list, skipping leading `-S <socket>` and `-f <config>`.
fn verb<'a>(args: &[&'a str]) -> &'a str {
    match args {
        ["-S" | "-f", _, rest @ ..] => verb(rest),
        [verb, ..] => *verb,
        [] => "",
    }
}

/// Typed front end to the tmux control channel.
#[derive(Clone)]
pub struct TmuxControl {
    runner: Arc<dyn CommandRunner>,
    /// Server socket (`-S`); `None` is tmux's default server.
    socket: Option<PathBuf>,
    timeout: Duration,
}

impl fmt::Debug for TmuxControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmuxControl")
            .field("socket", &self.socket)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TmuxControl {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            socket: None,
            timeout,
        }
    }

    /// Control channel backed by the given tmux binary and its default server.
    pub fn system(binary: &str, timeout: Duration) -> Self {
        Self::new(Arc::new(TmuxCommand::new(binary)), timeout)
    }

    /// Control channel for the server listening on `socket`.
    pub fn on_socket(binary: &str, socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::system(binary, timeout).with_socket(socket)
    }

    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn socket(&self) -> Option<&Path> {
        self.socket.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a verb without interpreting its exit status.
    pub fn exec(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        if let Some(socket) = &self.socket {
            args.splice(0..0, ["-S".to_string(), socket.to_string_lossy().into_owned()]);
        }
        debug!(args = ?args, "tmux");
        let output = self.runner.run(&args, self.timeout)?;
        if !output.success {
            debug!(args = ?args, stderr = %output.stderr.trim(), "tmux exited non-zero");
        }
        Ok(output)
    }

    /// Run a verb and fail on a non-zero exit.
    fn exec_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(HarnessError::CommandFailed {
                command: verb(args).to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// `tmux -V`.
    pub fn server_version(&self) -> Result<String> {
        Ok(self.exec_checked(&["-V"])?.trim().to_string())
    }

    pub fn new_session(&self, name: &str, width: u16, height: u16, config: &Path) -> Result<()> {
        let config = config.to_string_lossy();
        let width = width.to_string();
        let height = height.to_string();
        self.exec_checked(&[
            "-f",
            &config,
            "new-session",
            "-d",
            "-s",
            name,
            "-x",
            &width,
            "-y",
            &height,
        ])
        .map(|_| ())
    }

    /// Whether a session exists. Any failure counts as "no".
    pub fn has_session(&self, name: &str) -> bool {
        self.exec(&["has-session", "-t", name])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Kill a session. Returns false when there was nothing to kill.
    pub fn kill_session(&self, name: &str) -> Result<bool> {
        Ok(self.exec(&["kill-session", "-t", name])?.success)
    }

    /// Names of all sessions on the server. No server means no sessions.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let output = self.exec(&["list-sessions", "-F", "#{session_name}"])?;
        if !output.success {
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Pane ids of the target's active window, in tmux order.
    pub fn list_panes(&self, target: &str) -> Result<Vec<PaneId>> {
        let stdout = self.exec_checked(&["list-panes", "-t", target, "-F", "#{pane_id}"])?;
        parse_pane_ids(&stdout).map_err(|_| HarnessError::UnexpectedOutput {
            command: "list-panes".to_string(),
            output: stdout.clone(),
        })
    }

    /// Split `target` and return the new pane's id.
    pub fn split_window(&self, axis: SplitAxis, target: &str) -> Result<PaneId> {
        let output = self.exec(&[
            "split-window",
            axis.flag(),
            "-t",
            target,
            "-P",
            "-F",
            "#{pane_id}",
        ])?;
        if !output.success {
            return Err(HarnessError::SplitFailed(output.stderr.trim().to_string()));
        }
        output
            .stdout
            .parse::<PaneId>()
            .map_err(|_| HarnessError::UnexpectedOutput {
                command: "split-window".to_string(),
                output: output.stdout.clone(),
            })
    }

    /// Rendered pane text. `history` adds that many lines of scrollback.
    pub fn capture_pane(&self, target: &str, history: Option<u32>) -> Result<String> {
        match history {
            Some(lines) => {
                let start = format!("-{lines}");
                self.exec_checked(&["capture-pane", "-t", target, "-p", "-S", &start])
            }
            None => self.exec_checked(&["capture-pane", "-t", target, "-p"]),
        }
    }

    /// Expand a tmux format string against `target`.
    pub fn display_message(&self, target: &str, format: &str) -> Result<String> {
        Ok(self
            .exec_checked(&["display-message", "-t", target, "-p", format])?
            .trim()
            .to_string())
    }

    pub fn pane_height(&self, target: &str) -> Result<u16> {
        let raw = self.display_message(target, "#{pane_height}")?;
        raw.parse().map_err(|_| HarnessError::UnexpectedOutput {
            command: "display-message".to_string(),
            output: raw,
        })
    }

    /// Server-wide option value; empty when unset or when the query fails.
    pub fn show_global(&self, name: &str) -> String {
        match self.exec(&["show", "-gv", name]) {
            Ok(output) if output.success => output.stdout.trim().to_string(),
            Ok(_) => String::new(),
            Err(e) => {
                warn!(option = name, error = %e, "global option query failed");
                String::new()
            }
        }
    }

    pub fn set_global(&self, name: &str, value: &str) -> Result<()> {
        self.exec_checked(&["set", "-g", name, value]).map(|_| ())
    }

    /// Whether a server is listening on this channel's socket.
    pub fn server_running(&self) -> bool {
        self.exec(&["list-sessions"]).is_ok_and(|o| o.success)
    }

    /// Apply a config file to the running server.
    pub fn source_file(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.exec_checked(&["source-file", &path]).map(|_| ())
    }

    /// `send-keys` with tmux key names (`C-m`, `Escape`, ...).
    pub fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()> {
        let mut args = vec!["send-keys", "-t", target];
        args.extend_from_slice(keys);
        self.exec_checked(&args).map(|_| ())
    }

    /// `send-keys -l`: text is typed verbatim and never executed.
    pub fn send_literal(&self, target: &str, text: &str) -> Result<()> {
        self.exec_checked(&["send-keys", "-t", target, "-l", text])
            .map(|_| ())
    }
}

/// Check that tmux is installed and reachable.
pub fn tmux_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Handler = dyn Fn(&[String]) -> CommandOutput + Send + Sync;

    /// Scripted runner that records every invocation.
    pub(crate) struct FakeRunner {
        calls: Mutex<Vec<Vec<String>>>,
        handler: Box<Handler>,
    }

    impl FakeRunner {
        pub(crate) fn new(
            handler: impl Fn(&[String]) -> CommandOutput + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            })
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        /// Invocations whose tmux verb (first non-flag word) is `verb`.
        pub(crate) fn calls_to(&self, verb: &str) -> Vec<Vec<String>> {
            self.calls()
                .into_iter()
                .filter(|args| verb_of(args) == Some(verb))
                .collect()
        }
    }

    pub(crate) fn verb_of(args: &[String]) -> Option<&str> {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "-f" || arg == "-S" {
                iter.next();
                continue;
            }
            return Some(arg.as_str());
        }
        None
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, args: &[String], _timeout: Duration) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok((self.handler)(args))
        }
    }
}
