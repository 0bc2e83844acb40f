//! PTY tests that drive zsh directly, without tmux in between.
//!
//! zsh runs with `--no-rcs`, so nothing from the user's dotfiles leaks in.
//! Tests skip when zsh is not installed.
//!
//! Run with: `cargo test --test shell_tests -- --nocapture`

mod common;

use common::{init_test_logging, program_or_skip};
use muxprobe::keys;
use muxprobe::shell::PtyShell;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

/// A plugin that registers a completion function for `proj2` from its init hook.
const PLUGIN: &str = r#"
_proj2z() { _arguments '1:project:(alpha beta)' }
proj2_plugin_init() { compdef _proj2z proj2 }
"#;

fn zsh() -> PtyShell {
    let mut shell = PtyShell::zsh_no_rcs(TIMEOUT).unwrap();
    // Default --no-rcs prompt ends in "% " (or "# " as root)
    shell.wait_for("[%#] ", TIMEOUT).unwrap();
    shell
}

#[test]
fn test_completion_registered_after_init_hook() {
    if !program_or_skip("zsh") {
        return;
    }
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let plugin = dir.path().join("proj2.plugin.zsh");
    std::fs::write(&plugin, PLUGIN).unwrap();

    let mut shell = zsh();
    shell.send_line("autoload -Uz compinit && compinit -u -D").unwrap();
    shell
        .send_line(&format!("source {}", plugin.display()))
        .unwrap();

    // Not registered until the hook runs
    shell
        .run_and_expect("print -r -- \"before=${_comps[proj2]:-none}\"", "before=none")
        .unwrap();

    shell.send_line("proj2_plugin_init").unwrap();
    let found = shell
        .run_and_expect("print -r -- \"after=${_comps[proj2]}\"", "after=_proj2z")
        .unwrap();
    assert_eq!(found, "after=_proj2z");
    shell.close();
}

#[test]
fn test_meta_key_reaches_line_editor() {
    if !program_or_skip("zsh") {
        return;
    }
    init_test_logging();

    let mut shell = zsh();
    // Arithmetic keeps the expected text out of the echoed bindkey line
    shell
        .send_line(r"bindkey -s '^[D' 'echo meta-$((20 + 3))\n'")
        .unwrap();
    shell
        .send_raw(keys::meta('D').as_bytes(), Duration::ZERO)
        .unwrap();
    shell.wait_for("meta-23", TIMEOUT).unwrap();
    assert!(shell.content().unwrap().contains("meta-23"));
    shell.close();
}

#[test]
fn test_ctrl_c_abandons_line() {
    if !program_or_skip("zsh") {
        return;
    }
    init_test_logging();

    let mut shell = zsh();
    shell.send_raw(b"echo never-run", Duration::ZERO).unwrap();
    shell
        .send_raw(keys::CTRL_C.as_bytes(), Duration::from_millis(100))
        .unwrap();
    shell
        .run_and_expect("echo ran-$((2 * 21))", "ran-42")
        .unwrap();
    shell.close();
}
