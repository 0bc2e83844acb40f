//! Raw keystroke injection through a PTY-attached tmux client.
//!
//! Bytes written here reach tmux exactly as a physical keyboard would deliver
//! them, so prefix-key bindings and meta/escape sequences fire for real. This
//! path is never used for queries; those go through [`crate::control`].

use crate::error::{HarnessError, Result};
use expectrl::{Regex, Session, session::OsProcess};
use std::io;
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

/// Exclusively owned PTY handle used for raw byte injection.
pub struct RawKeyInjector {
    session: Option<Session<OsProcess>>,
}

impl std::fmt::Debug for RawKeyInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawKeyInjector")
            .field("started", &self.session.is_some())
            .finish()
    }
}

impl RawKeyInjector {
    /// An injector with no process behind it. Every operation fails with `NotStarted`.
    pub fn detached() -> Self {
        Self { session: None }
    }

    /// Spawn `command` in a PTY of `width` x `height` cells.
    pub fn spawn(command: Command, width: u16, height: u16, timeout: Duration) -> Result<Self> {
        let mut session = Session::spawn(command)?;
        session
            .get_process_mut()
            .set_window_size(width, height)
            .map_err(|e| io::Error::other(e.to_string()))?;
        session.set_expect_timeout(Some(timeout));
        Ok(Self {
            session: Some(session),
        })
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    fn session_mut(&mut self) -> Result<&mut Session<OsProcess>> {
        self.session.as_mut().ok_or(HarnessError::NotStarted)
    }

    /// Write literal bytes. No line ending is appended.
    pub fn send_raw(&mut self, bytes: &[u8], inter_key_delay: Duration) -> Result<()> {
        let session = self.session_mut()?;
        debug!(bytes = ?bytes, "raw send");
        session.send(bytes)?;
        sleep(inter_key_delay);
        Ok(())
    }

    /// Prefix byte and key as two separate writes.
    ///
    /// tmux's prefix detection misses the key when both arrive in one read, so
    /// they are never coalesced.
    pub fn send_prefixed_key(
        &mut self,
        prefix: u8,
        key: &str,
        inter_key_delay: Duration,
        settle_delay: Duration,
    ) -> Result<()> {
        let session = self.session_mut()?;
        session.send([prefix])?;
        sleep(inter_key_delay);
        session.send(key)?;
        sleep(settle_delay);
        Ok(())
    }

    /// Send bytes, then block until `pattern` (a regex) appears in the PTY output.
    ///
    /// Returns the matched text.
    pub fn send_and_expect(
        &mut self,
        bytes: &[u8],
        pattern: &str,
        timeout: Duration,
    ) -> Result<String> {
        regex::Regex::new(pattern)?;
        let session = self.session_mut()?;
        session.send(bytes)?;
        session.set_expect_timeout(Some(timeout));
        match session.expect(Regex(pattern)) {
            Ok(found) => Ok(found
                .get(0)
                .map(|m| String::from_utf8_lossy(m).into_owned())
                .unwrap_or_default()),
            Err(expectrl::Error::ExpectTimeout) => Err(HarnessError::PatternNotFound {
                pattern: pattern.to_string(),
                timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Drain whatever the PTY has buffered without blocking.
    pub fn read_available(&mut self) -> Result<String> {
        let session = self.session_mut()?;
        let mut buf = [0u8; 4096];
        let mut out = Vec::new();
        loop {
            match session.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Force-close the PTY process. Errors are logged, never returned.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.get_process_mut().exit(true) {
                warn!(error = %e, "failed to close PTY process");
            }
        }
    }
}

impl Drop for RawKeyInjector {
    fn drop(&mut self) {
        self.close();
    }
}
