//! Lifecycle of one named tmux session.
//!
//! A [`TmuxSession`] moves through
//! `Uninitialized -> Creating -> ReadinessProbing -> Attached -> TornDown`.
//! Creation order matters: the session is created detached, confirmed to exist,
//! probed for shell readiness, and only then attached through a PTY. Attaching
//! first leaves the shell uninitialized.
//!
//! Queries and layout changes go through the control channel; raw keystrokes
//! go through the attached PTY. The two are not ordered relative to each
//! other, so callers must let keystrokes settle before querying.

use crate::config::{ConfigSource, HarnessConfig};
use crate::control::{PaneId, PaneTarget, SplitAxis, TmuxControl};
use crate::error::{HarnessError, Result};
use crate::globals::HARNESS_GLOBALS;
use crate::injector::RawKeyInjector;
use crate::keys;
use crate::polling::{PollSettings, poll_until};
use crate::readiness::{ReadinessProbe, TmuxShellChannel, process_marker};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

/// Distinguishes sessions created by one process within the same second.
static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Creating,
    ReadinessProbing,
    Attached,
    TornDown,
}

/// Restrict a session name to characters tmux targets cannot misparse.
///
/// `.` and `:` separate window and pane in a target, so they are replaced.
pub fn sanitize_session_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `<prefix>-<pid>-<unix secs>-<n>`.
pub fn generate_session_name(prefix: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let n = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
    sanitize_session_name(&format!("{prefix}-{}-{secs}-{n}", std::process::id()))
}

/// How to create a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub name: Option<String>,
    pub config_source: ConfigSource,
    /// Attach a PTY for raw keystrokes. Control-only sessions skip this.
    pub attach: bool,
    pub harness: HarnessConfig,
}

impl SessionOptions {
    pub fn new(config_source: ConfigSource) -> Self {
        Self {
            name: None,
            config_source,
            attach: true,
            harness: HarnessConfig::load(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_harness_config(mut self, harness: HarnessConfig) -> Self {
        self.harness = harness;
        self
    }

    #[must_use]
    pub fn without_pty(mut self) -> Self {
        self.attach = false;
        self
    }

    /// The sanitized session name, generating one when none was given.
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) => sanitize_session_name(name),
            None => generate_session_name(&self.harness.session_prefix),
        }
    }

    #[must_use]
    pub fn with_geometry(mut self, width: u16, height: u16) -> Self {
        self.harness.width = width;
        self.harness.height = height;
        self
    }
}

/// One live tmux session owned by the harness. Torn down on drop.
#[derive(Debug)]
pub struct TmuxSession {
    name: String,
    config_source: ConfigSource,
    config: HarnessConfig,
    control: TmuxControl,
    injector: RawKeyInjector,
    state: SessionState,
    ready: bool,
    cleaned_up: bool,
}

impl TmuxSession {
    /// Create a session on a server of its own (or the configured shared one).
    pub fn create(mut options: SessionOptions) -> Result<Self> {
        let name = options.resolved_name();
        let harness = &options.harness;
        let socket_dir = harness.socket_dir();
        std::fs::create_dir_all(&socket_dir).map_err(|e| HarnessError::SessionCreationFailed {
            session: name.clone(),
            reason: format!("cannot create socket directory {}: {e}", socket_dir.display()),
        })?;
        let control = TmuxControl::on_socket(
            &harness.tmux_binary,
            harness.socket_path(&name),
            harness.timeout(),
        );
        options.name = Some(name);
        Self::create_with_control(options, control)
    }

    /// Create a session through an explicit control channel.
    #[instrument(skip_all, fields(session))]
    pub fn create_with_control(options: SessionOptions, control: TmuxControl) -> Result<Self> {
        let name = options.resolved_name();
        let SessionOptions {
            config_source,
            attach,
            harness,
            ..
        } = options;
        let server_preexisting = harness.shares_server() && control.server_running();
        tracing::Span::current().record("session", name.as_str());

        let mut session = Self {
            name,
            config_source,
            config: harness,
            control,
            injector: RawKeyInjector::detached(),
            state: SessionState::Uninitialized,
            ready: false,
            // Nothing to tear down until the OS session exists.
            cleaned_up: true,
        };

        session.state = SessionState::Creating;
        session.start_detached()?;
        session.cleaned_up = false;
        if server_preexisting {
            session.apply_config_to_running_server()?;
        }

        session.state = SessionState::ReadinessProbing;
        session.ready = session.probe_readiness();

        if attach {
            // On failure `session` drops here and kills the detached session.
            session.attach()?;
        }
        session.state = SessionState::Attached;
        info!(session = %session.name, ready = session.ready, "tmux session created");
        Ok(session)
    }

    fn creation_failed(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::SessionCreationFailed {
            session: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Exact-match target; a bare name would also match longer names by prefix.
    fn exact(&self) -> String {
        format!("={}", self.name)
    }

    /// Window target inside this session; `=` keeps a longer name from matching.
    fn window_target(&self) -> String {
        format!("{}:", self.exact())
    }

    /// `-f` only applies when a server starts, so a shared server that was
    /// already up gets the config sourced explicitly.
    fn apply_config_to_running_server(&self) -> Result<()> {
        match &self.config_source {
            ConfigSource::User(path) => {
                warn!(
                    session = %self.name,
                    config = %path.display(),
                    "shared tmux server already running, sourcing config into it"
                );
                self.control
                    .source_file(path)
                    .map_err(|e| self.creation_failed(format!("source-file failed: {e}")))
            }
            ConfigSource::Empty => {
                warn!(
                    session = %self.name,
                    "shared tmux server already running, its existing config stays in effect"
                );
                Ok(())
            }
        }
    }

    fn start_detached(&mut self) -> Result<()> {
        // Leftover from a crashed run with the same name.
        if let Ok(true) = self.control.kill_session(&self.exact()) {
            debug!(session = %self.name, "killed pre-existing session");
        }

        self.control
            .new_session(
                &self.name,
                self.config.width,
                self.config.height,
                self.config_source.path(),
            )
            .map_err(|e| self.creation_failed(e.to_string()))?;
        sleep(self.config.create_settle());

        let exact = self.exact();
        let settings = PollSettings::new(self.config.timeout(), self.config.poll_interval());
        if !poll_until(settings, || self.control.has_session(&exact)) {
            return Err(self.creation_failed("session not listed after creation"));
        }
        Ok(())
    }

    fn probe_readiness(&self) -> bool {
        let probe = ReadinessProbe {
            marker: process_marker(),
            max_attempts: self.config.readiness_attempts,
            settle: Duration::from_millis(self.config.readiness_settle_ms),
            interval: Duration::from_millis(self.config.readiness_interval_ms),
        };
        let target = self.window_target();
        probe.run(&TmuxShellChannel::new(&self.control, &target))
    }

    fn attach(&mut self) -> Result<()> {
        let mut command = Command::new(&self.config.tmux_binary);
        if let Some(socket) = self.control.socket() {
            command.arg("-S").arg(socket);
        }
        command
            .arg("-f")
            .arg(self.config_source.path())
            .args(["attach", "-t", &self.exact()])
            // tmux refuses to attach from inside another tmux client.
            .env_remove("TMUX");
        if std::env::var("TERM").map_or(true, |t| t.is_empty() || t == "dumb") {
            command.env("TERM", "xterm-256color");
        }

        self.injector = RawKeyInjector::spawn(
            command,
            self.config.width,
            self.config.height,
            self.config.timeout(),
        )
        .map_err(|e| self.creation_failed(format!("attach failed: {e}")))?;
        sleep(self.config.attach_settle());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the readiness probe confirmed the shell.
    pub fn shell_ready(&self) -> bool {
        self.ready
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn config_source(&self) -> &ConfigSource {
        &self.config_source
    }

    pub fn control(&self) -> &TmuxControl {
        &self.control
    }

    fn ensure_live(&self) -> Result<()> {
        if self.cleaned_up {
            Err(HarnessError::NotStarted)
        } else {
            Ok(())
        }
    }

    fn target(&self, pane: Option<&PaneTarget>) -> String {
        pane.map_or_else(|| self.window_target(), |p| p.resolve(&self.exact()))
    }

    // ----- layout -----

    /// Split the active pane (or `pane`). Does not wait for the new pane to settle.
    pub fn split_pane(&self, axis: SplitAxis, pane: Option<&PaneTarget>) -> Result<PaneId> {
        self.ensure_live()?;
        let pane_id = self.control.split_window(axis, &self.target(pane))?;
        debug!(session = %self.name, pane = %pane_id, "split");
        Ok(pane_id)
    }

    /// Fresh pane listing; never cached.
    pub fn list_panes(&self) -> Result<Vec<PaneId>> {
        self.ensure_live()?;
        self.control.list_panes(&self.window_target())
    }

    pub fn pane_count(&self) -> Result<usize> {
        Ok(self.list_panes()?.len())
    }

    /// Wait until the pane count equals `expected`.
    pub fn wait_for_pane_count(&self, expected: usize, timeout: Duration) -> bool {
        let settings = PollSettings::new(timeout, self.config.poll_interval());
        poll_until(settings, || {
            self.pane_count().is_ok_and(|count| count == expected)
        })
    }

    // ----- observation -----

    /// Rendered content of `pane` (default: active pane).
    ///
    /// With `include_history` the configured scrollback (1000 lines) is included.
    pub fn capture_pane(&self, pane: Option<&PaneTarget>, include_history: bool) -> Result<String> {
        self.ensure_live()?;
        let history = include_history.then_some(self.config.history_lines);
        self.control.capture_pane(&self.target(pane), history)
    }

    pub fn pane_height(&self, pane: Option<&PaneTarget>) -> Result<u16> {
        self.ensure_live()?;
        self.control.pane_height(&self.target(pane))
    }

    /// Left and right status bar, concatenated.
    pub fn status_bar_text(&self) -> Result<String> {
        self.ensure_live()?;
        self.control
            .display_message(&self.window_target(), "#{status-left}#{status-right}")
    }

    /// Wait for `text` to appear in `pane`, polling at the configured interval.
    pub fn wait_for_text(&self, text: &str, timeout: Duration, pane: Option<&PaneTarget>) -> bool {
        self.wait_for_text_every(
            text,
            PollSettings::new(timeout, self.config.poll_interval()),
            pane,
        )
    }

    /// [`TmuxSession::wait_for_text`] with an explicit poll interval.
    pub fn wait_for_text_every(
        &self,
        text: &str,
        settings: PollSettings,
        pane: Option<&PaneTarget>,
    ) -> bool {
        poll_until(settings, || {
            self.capture_pane(pane, true)
                .is_ok_and(|content| content.contains(text))
        })
    }

    // ----- global variables -----

    /// Server-wide variable. Empty when unset or when the query fails.
    ///
    /// See [`crate::globals::is_unset`] for interpreting the value.
    pub fn get_global_variable(&self, name: &str) -> String {
        self.control.show_global(name)
    }

    pub fn set_global_variable(&self, name: &str, value: &str) -> Result<()> {
        self.control.set_global(name, value)
    }

    // ----- input -----

    /// Type `text` into the active pane via the control channel and press Enter.
    pub fn send_line(&self, text: &str) -> Result<()> {
        self.ensure_live()?;
        self.control.send_keys(&self.target(None), &[text, "C-m"])?;
        sleep(self.config.settle_delay());
        Ok(())
    }

    /// Type `text` verbatim via the control channel without executing it.
    pub fn send_literal(&self, text: &str) -> Result<()> {
        self.ensure_live()?;
        self.control.send_literal(&self.target(None), text)?;
        sleep(self.config.settle_delay());
        Ok(())
    }

    /// Raw bytes into the attached PTY, followed by the settle delay.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let settle = self.config.settle_delay();
        self.injector.send_raw(bytes, settle)
    }

    /// Ctrl-b followed by `key`, as two separate PTY writes.
    pub fn send_prefix_key(&mut self, key: &str) -> Result<()> {
        let inter = self.config.inter_key_delay();
        let settle = self.config.settle_delay();
        self.injector
            .send_prefixed_key(keys::PREFIX, key, inter, settle)
    }

    /// Raw bytes, then wait for `pattern` in the PTY stream.
    pub fn send_and_expect(&mut self, bytes: &[u8], pattern: &str, timeout: Duration) -> Result<String> {
        self.injector.send_and_expect(bytes, pattern, timeout)
    }

    // ----- teardown -----

    /// Close the PTY, clear harness globals, kill the session. Never fails.
    ///
    /// Only the first call does anything.
    #[instrument(skip_all, fields(session = %self.name))]
    pub fn teardown(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        self.injector.close();

        for var in HARNESS_GLOBALS {
            if let Err(e) = self.control.set_global(var, "") {
                debug!(variable = var, error = %e, "could not clear global");
            }
        }

        match self.control.kill_session(&self.exact()) {
            Ok(true) => info!("tmux session killed"),
            Ok(false) => debug!("tmux session already gone"),
            Err(e) => warn!(error = %e, "kill-session failed"),
        }
        self.state = SessionState::TornDown;
    }
}

impl Drop for TmuxSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Kill every session on `control`'s server whose name starts with `prefix`.
pub fn kill_orphans_on(control: &TmuxControl, prefix: &str) -> Result<Vec<String>> {
    let mut killed = Vec::new();
    for name in control.list_sessions()? {
        if name.starts_with(prefix) && control.kill_session(&format!("={name}"))? {
            killed.push(name);
        }
    }
    Ok(killed)
}

/// Kill matching sessions on every server in the harness socket directory.
///
/// Returns the names killed. A missing directory means nothing ever ran.
pub fn kill_orphans(config: &HarnessConfig, prefix: &str) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(config.socket_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut killed = Vec::new();
    for entry in entries {
        let socket = entry?.path();
        let control = TmuxControl::on_socket(&config.tmux_binary, &socket, config.timeout());
        killed.extend(kill_orphans_on(&control, prefix)?);
    }
    killed.sort();
    Ok(killed)
}
