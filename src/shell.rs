//! A shell driven directly through a PTY, without tmux in between.
//!
//! Used for checks that only need a line-oriented conversation with an
//! interactive shell, such as asking zsh which completion function is
//! registered for a command after `compinit` and a plugin's init hook ran.

use crate::error::Result;
use crate::injector::RawKeyInjector;
use std::process::Command;
use std::time::Duration;

#[derive(Debug)]
pub struct PtyShell {
    pty: RawKeyInjector,
    transcript: String,
    timeout: Duration,
}

impl PtyShell {
    /// Spawn `program args...` in an 80x24 PTY.
    pub fn spawn(program: &str, args: &[&str], timeout: Duration) -> Result<Self> {
        let mut command = Command::new(program);
        command.args(args);
        if std::env::var("TERM").map_or(true, |t| t.is_empty() || t == "dumb") {
            command.env("TERM", "xterm-256color");
        }
        Ok(Self {
            pty: RawKeyInjector::spawn(command, 80, 24, timeout)?,
            transcript: String::new(),
            timeout,
        })
    }

    /// zsh without any startup files.
    pub fn zsh_no_rcs(timeout: Duration) -> Result<Self> {
        Self::spawn("zsh", &["--no-rcs"], timeout)
    }

    /// Type `text` and press Enter.
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        self.pty.send_raw(format!("{text}\r").as_bytes(), Duration::ZERO)
    }

    /// Write bytes with no line ending, then pause for `delay`.
    pub fn send_raw(&mut self, bytes: &[u8], delay: Duration) -> Result<()> {
        self.pty.send_raw(bytes, delay)
    }

    /// Block until the regex `pattern` shows up in the output; returns the match.
    pub fn wait_for(&mut self, pattern: &str, timeout: Duration) -> Result<String> {
        self.pty.send_and_expect(b"", pattern, timeout).inspect(|found| {
            self.transcript.push_str(found);
        })
    }

    /// [`PtyShell::wait_for`] with `text` matched literally and the default timeout.
    pub fn wait_for_text(&mut self, text: &str) -> Result<String> {
        self.wait_for(&regex::escape(text), self.timeout)
    }

    /// Send a command line and wait for `pattern` in its output.
    pub fn run_and_expect(&mut self, line: &str, pattern: &str) -> Result<String> {
        self.send_line(line)?;
        self.wait_for(pattern, self.timeout)
    }

    /// Matched text from earlier waits plus anything still unread, ANSI-stripped.
    pub fn content(&mut self) -> Result<String> {
        let pending = self.pty.read_available()?;
        self.transcript.push_str(&pending);
        Ok(strip_ansi_escapes::strip_str(&self.transcript))
    }

    pub fn close(&mut self) {
        self.pty.close();
    }
}
