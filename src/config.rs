//! Harness configuration.
//!
//! Every delay, poll interval and attempt count the harness uses lives here so
//! slow environments can be simulated by editing `~/.muxprobe/config.toml`
//! instead of the code. Missing or unparsable files fall back to defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Null-device path tmux accepts as "no configuration file".
pub const NO_CONFIG_PATH: &str = "/dev/null";

/// Which tmux configuration a session is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A user configuration file (normally `~/.tmux.conf`).
    User(PathBuf),
    /// No configuration at all.
    Empty,
}

impl ConfigSource {
    /// The ambient user configuration, `~/.tmux.conf`.
    pub fn user_default() -> Self {
        let path = home::home_dir()
            .map(|mut p| {
                p.push(".tmux.conf");
                p
            })
            .unwrap_or_else(|| PathBuf::from(".tmux.conf"));
        Self::User(path)
    }

    /// Path handed to `tmux -f`.
    pub fn path(&self) -> &Path {
        match self {
            Self::User(path) => path,
            Self::Empty => Path::new(NO_CONFIG_PATH),
        }
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::user_default()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    pub tmux_binary: String,
    pub width: u16,
    pub height: u16,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_settle_ms: u64,
    pub readiness_interval_ms: u64,
    pub inter_key_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub create_settle_ms: u64,
    pub attach_settle_ms: u64,
    pub split_settle_ms: u64,
    pub history_lines: u32,
    pub session_prefix: String,
    /// Directory holding the harness's tmux sockets (default: `<tmp>/muxprobe`).
    pub socket_dir: Option<PathBuf>,
    /// Shared socket name. Unset means every session runs its own server,
    /// so its config file is always the one the server starts with.
    pub socket_name: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tmux_binary: "tmux".to_string(),
            width: 120,
            height: 40,
            timeout_secs: 5,
            poll_interval_ms: 100,
            readiness_attempts: 10,
            readiness_settle_ms: 150,
            readiness_interval_ms: 100,
            inter_key_delay_ms: 50,
            settle_delay_ms: 150,
            create_settle_ms: 300,
            attach_settle_ms: 200,
            split_settle_ms: 200,
            history_lines: 1000,
            session_prefix: "muxprobe".to_string(),
            socket_dir: None,
            socket_name: None,
        }
    }
}

impl HarnessConfig {
    /// Load `~/.muxprobe/config.toml`, or defaults.
    pub fn load() -> Self {
        home::home_dir()
            .map(|mut p| {
                p.push(".muxprobe");
                p.push("config.toml");
                p
            })
            .filter(|p| p.exists())
            .and_then(|p| Self::from_file(&p).ok())
            .unwrap_or_default()
    }

    /// Parse a specific config file. Unlike [`HarnessConfig::load`], errors are reported.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> crate::Result<Self> {
        toml::from_str(text).map_err(|e| crate::HarnessError::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn inter_key_delay(&self) -> Duration {
        Duration::from_millis(self.inter_key_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn create_settle(&self) -> Duration {
        Duration::from_millis(self.create_settle_ms)
    }

    pub fn attach_settle(&self) -> Duration {
        Duration::from_millis(self.attach_settle_ms)
    }

    pub fn split_settle(&self) -> Duration {
        Duration::from_millis(self.split_settle_ms)
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("muxprobe"))
    }

    /// Socket the server for `session` listens on.
    pub fn socket_path(&self, session: &str) -> PathBuf {
        self.socket_dir()
            .join(self.socket_name.as_deref().unwrap_or(session))
    }

    /// Whether sessions share one server (and may find it already running).
    pub fn shares_server(&self) -> bool {
        self.socket_name.is_some()
    }
}
