use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use muxprobe::logging;
use muxprobe::scenario::{self, ToggleBinding};
use muxprobe::session::{generate_session_name, kill_orphans};
use muxprobe::shell_fn::ShellScript;
use muxprobe::{ConfigSource, HarnessConfig, SessionOptions, TmuxControl, TmuxSession};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Session currently owned by this process, killed on Ctrl-C (signals skip `Drop`).
static ACTIVE_SESSION: Mutex<Option<ActiveSession>> = Mutex::new(None);

#[derive(Clone)]
struct ActiveSession {
    binary: String,
    socket: PathBuf,
    name: String,
}

impl ActiveSession {
    fn kill_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-S")
            .arg(&self.socket)
            .args(["kill-session", "-t", &format!("={}", self.name)]);
        command
    }
}

#[derive(Parser)]
#[command(name = "muxprobe")]
#[command(version)]
#[command(about = "Drive real tmux sessions to test shell keybindings")]
struct Args {
    /// Harness settings file (default: ~/.muxprobe/config.toml)
    #[arg(long, global = true)]
    harness_config: Option<PathBuf>,

    /// Suppress progress lines (tracing output is still governed by RUST_LOG)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that tmux is available and show the effective settings
    Check,
    /// Toggle a prefix-key pane binding on and off
    Toggle {
        #[command(flatten)]
        target: TargetArgs,
        /// Number of on/off cycles
        #[arg(long, default_value_t = 1)]
        cycles: u32,
    },
    /// Split, toggle, switch panes and split again; the toggle pane must survive
    SplitToggle {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Check a project-name validator function against the documented rules
    Validate {
        /// Script defining the function
        #[arg(long)]
        script: PathBuf,
        /// Function to call
        #[arg(long, default_value = "_proj2z_validate_project_name")]
        function: String,
        /// Shell to source the script with
        #[arg(long, default_value = "zsh")]
        shell: String,
    },
    /// Kill leftover harness sessions
    Cleanup {
        /// Session name prefix (default: the configured prefix)
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(ClapArgs)]
struct TargetArgs {
    /// Key pressed after the prefix
    #[arg(short, long, default_value = "h")]
    key: String,
    /// Global variable the binding records its pane in
    #[arg(long, default_value = muxprobe::globals::HELP_PANE_ID)]
    variable: String,
    /// tmux config to start the session with (default: ~/.tmux.conf)
    #[arg(long, conflicts_with = "no_config")]
    config: Option<PathBuf>,
    /// Start the session with no tmux config
    #[arg(long)]
    no_config: bool,
    /// Seconds to wait for each pane change
    #[arg(long, default_value_t = 2)]
    wait: u64,
}

impl TargetArgs {
    fn config_source(&self) -> ConfigSource {
        match (&self.config, self.no_config) {
            (_, true) => ConfigSource::Empty,
            (Some(path), false) => ConfigSource::User(path.clone()),
            (None, false) => ConfigSource::user_default(),
        }
    }

    fn binding(&self) -> ToggleBinding {
        ToggleBinding {
            key: self.key.clone(),
            variable: self.variable.clone(),
            timeout: Duration::from_secs(self.wait),
        }
    }
}

fn load_harness_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    match path {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(HarnessConfig::load()),
    }
}

fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        let active = match ACTIVE_SESSION.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(session) = active {
            let name = &session.name;
            eprintln!("\n[interrupted, killing {name}]");
            match session.kill_command().status() {
                Ok(s) if s.success() => {}
                Ok(s) => tracing::warn!(session = %name, status = %s, "kill-session failed"),
                Err(e) => {
                    tracing::warn!(session = %name, error = %e, "could not run {}", session.binary)
                }
            }
        }
        std::process::exit(130);
    })?;
    Ok(())
}

fn set_active(entry: Option<ActiveSession>) {
    match ACTIVE_SESSION.lock() {
        Ok(mut guard) => *guard = entry,
        Err(poisoned) => *poisoned.into_inner() = entry,
    }
}

#[cfg(test)]
fn active_name() -> Option<String> {
    match ACTIVE_SESSION.lock() {
        Ok(guard) => guard.as_ref().map(|s| s.name.clone()),
        Err(poisoned) => poisoned.into_inner().as_ref().map(|s| s.name.clone()),
    }
}

/// Create a session, run `body`, tear down, report.
fn run_in_session(
    harness: HarnessConfig,
    target: &TargetArgs,
    title: &str,
    body: impl FnOnce(&mut TmuxSession) -> Result<()>,
) -> Result<()> {
    let source = target.config_source();
    eprintln!(
        "{} {} ({})",
        "[muxprobe]".bold(),
        title,
        source.path().display().to_string().yellow()
    );

    // Registered before creation so an interrupt during the readiness check
    // still finds the session.
    let name = generate_session_name(&harness.session_prefix);
    set_active(Some(ActiveSession {
        binary: harness.tmux_binary.clone(),
        socket: harness.socket_path(&name),
        name: name.clone(),
    }));
    let created = TmuxSession::create(
        SessionOptions::new(source)
            .with_name(name)
            .with_harness_config(harness),
    );
    let mut session = match created {
        Ok(session) => session,
        Err(e) => {
            set_active(None);
            return Err(e).context("creating tmux session");
        }
    };
    if !session.shell_ready() {
        eprintln!("{}", "[shell readiness not confirmed, continuing]".yellow());
    }

    let outcome = body(&mut session);
    session.teardown();
    set_active(None);

    match &outcome {
        Ok(()) => eprintln!("{}", format!("[{title}: passed]").green()),
        Err(e) => eprintln!("{}", format!("[{title}: failed] {e:#}").red()),
    }
    outcome
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.quiet {
        logging::disable_logging();
    }
    let harness = load_harness_config(args.harness_config.as_ref())?;
    install_interrupt_handler()?;

    match args.command {
        Commands::Check => {
            let control = TmuxControl::system(&harness.tmux_binary, harness.timeout());
            let version = control
                .server_version()
                .with_context(|| format!("running {} -V", harness.tmux_binary))?;
            println!("{} {}", "tmux:".bold(), version.green());
            println!(
                "geometry {}x{}, timeout {}s, poll {}ms, readiness {} attempts",
                harness.width,
                harness.height,
                harness.timeout_secs,
                harness.poll_interval_ms,
                harness.readiness_attempts
            );
            println!("sockets in {}", harness.socket_dir().display());
            Ok(())
        }
        Commands::Toggle { target, cycles } => {
            let binding = target.binding();
            run_in_session(harness, &target, "toggle", |session| {
                scenario::toggle_cycles(session, &binding, cycles)
            })
        }
        Commands::SplitToggle { target } => {
            let binding = target.binding();
            run_in_session(harness, &target, "split-toggle", |session| {
                scenario::split_independence(session, &binding)
            })
        }
        Commands::Validate {
            script,
            function,
            shell,
        } => {
            let script = ShellScript::new(shell, script).with_timeout(harness.timeout());
            scenario::check_validator(&script, &function, &scenario::project_name_cases())?;
            eprintln!("{}", format!("[{function}: passed]").green());
            Ok(())
        }
        Commands::Cleanup { prefix } => {
            let prefix = prefix.unwrap_or_else(|| harness.session_prefix.clone());
            let killed = kill_orphans(&harness, &prefix)?;
            if killed.is_empty() {
                eprintln!(
                    "[no sessions matching {prefix} under {}]",
                    harness.socket_dir().display()
                );
            }
            for name in killed {
                println!("killed {name}");
            }
            Ok(())
        }
    }
}
