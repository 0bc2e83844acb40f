//! Test-scoped sessions.
//!
//! A [`SessionFixture`] owns a [`TmuxSession`] for the duration of one test
//! body and tears it down when it goes out of scope, including when the test
//! panics. Two isolation levels are offered: the user's own `~/.tmux.conf`
//! (to exercise real keybindings) or no configuration at all.

use crate::config::{ConfigSource, HarnessConfig};
use crate::error::Result;
use crate::session::{SessionOptions, TmuxSession};
use std::ops::{Deref, DerefMut};

/// Geometry every fixture session is created with.
pub const FIXTURE_WIDTH: u16 = 120;
pub const FIXTURE_HEIGHT: u16 = 40;

fn fixture_options(source: ConfigSource) -> SessionOptions {
    SessionOptions::new(source).with_geometry(FIXTURE_WIDTH, FIXTURE_HEIGHT)
}

#[derive(Debug)]
pub struct SessionFixture {
    session: TmuxSession,
}

impl SessionFixture {
    pub fn from_options(options: SessionOptions) -> Result<Self> {
        Ok(Self {
            session: TmuxSession::create(options)?,
        })
    }

    /// Session running with the user's `~/.tmux.conf`.
    pub fn with_user_config() -> Result<Self> {
        Self::from_options(fixture_options(ConfigSource::user_default()))
    }

    /// Session running with no tmux configuration.
    pub fn minimal() -> Result<Self> {
        Self::from_options(fixture_options(ConfigSource::Empty))
    }

    /// Session with the given config source and harness settings.
    pub fn with_config(source: ConfigSource, harness: HarnessConfig) -> Result<Self> {
        Self::from_options(
            SessionOptions::new(source)
                .with_harness_config(harness)
                .with_geometry(FIXTURE_WIDTH, FIXTURE_HEIGHT),
        )
    }

    /// Run `body` against a fresh session and tear it down afterwards.
    ///
    /// A panicking body still tears the session down while unwinding.
    pub fn with_session<T>(
        options: SessionOptions,
        body: impl FnOnce(&mut TmuxSession) -> T,
    ) -> Result<T> {
        let mut fixture = Self::from_options(options)?;
        let value = body(&mut fixture.session);
        fixture.session.teardown();
        Ok(value)
    }

    pub fn session(&self) -> &TmuxSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TmuxSession {
        &mut self.session
    }
}

impl Deref for SessionFixture {
    type Target = TmuxSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for SessionFixture {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl Drop for SessionFixture {
    fn drop(&mut self) {
        self.session.teardown();
    }
}
