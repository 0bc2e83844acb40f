//! Call one function from a shell script in a non-interactive shell.
//!
//! Shell plugins expose helper functions (validators, status formatters) that
//! can be checked without a terminal: source the script, call the function,
//! look at the exit status and the two output streams.

use crate::control::run_with_timeout;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code; `None` when the shell was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct ShellScript {
    shell: String,
    script: PathBuf,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ShellScript {
    pub fn new(shell: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            script: script.into(),
            env: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// zsh without startup files.
    pub fn zsh(script: impl Into<PathBuf>) -> Self {
        Self::new("zsh", script)
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Source the script, then run `function args...`.
    pub fn call(&self, function: &str, args: &[&str]) -> Result<ShellOutput> {
        let mut command = Command::new(&self.shell);
        if self.shell.ends_with("zsh") {
            command.arg("--no-rcs");
        }
        // $0 is the script path, "$@" the function call.
        command
            .arg("-c")
            .arg(r#". "$0" && "$@""#)
            .arg(&self.script)
            .arg(function)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k, v)));

        let (status, stdout, stderr) = run_with_timeout(command, function, self.timeout)?;
        Ok(ShellOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}
