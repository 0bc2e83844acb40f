//! End-to-end checks of shell configuration behavior.
//!
//! Each scenario drives a live session (or a shell script) and fails with an
//! error that carries enough context to debug without rerunning: the pane
//! list, the relevant global variable and the captured pane text.

use crate::control::SplitAxis;
use crate::globals::{HELP_PANE_ID, is_unset};
use crate::logging::log_event;
use crate::session::TmuxSession;
use crate::shell_fn::ShellScript;
use anyhow::{Context, Result, bail};
use std::thread::sleep;
use std::time::Duration;

/// A prefix-key binding that toggles one extra pane and records it in a global.
#[derive(Debug, Clone)]
pub struct ToggleBinding {
    pub key: String,
    pub variable: String,
    /// How long to wait for the pane count to change after the keystroke.
    pub timeout: Duration,
}

impl Default for ToggleBinding {
    fn default() -> Self {
        Self {
            key: "h".to_string(),
            variable: HELP_PANE_ID.to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// What a successful toggle-on observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReport {
    pub baseline_panes: usize,
    pub toggled_pane: String,
}

/// Pane list and active pane text for failure messages.
pub fn diagnostics(session: &TmuxSession) -> String {
    let panes = session
        .list_panes()
        .map(|p| format!("{p:?}"))
        .unwrap_or_else(|e| format!("<list-panes failed: {e}>"));
    let content = session
        .capture_pane(None, false)
        .unwrap_or_else(|e| format!("<capture failed: {e}>"));
    format!("panes: {panes}\nactive pane content:\n{content}")
}

fn expect_pane_count(session: &TmuxSession, expected: usize, timeout: Duration, step: &str) -> Result<()> {
    if session.wait_for_pane_count(expected, timeout) {
        return Ok(());
    }
    let actual = session
        .pane_count()
        .map_or_else(|e| format!("<error: {e}>"), |n| n.to_string());
    bail!(
        "{step}: expected {expected} panes, got {actual}\n{}",
        diagnostics(session)
    )
}

/// Press the binding once and check one pane appeared and was recorded.
pub fn toggle_on(session: &mut TmuxSession, binding: &ToggleBinding) -> Result<ToggleReport> {
    let baseline = session.pane_count().context("counting panes")?;
    session
        .send_prefix_key(&binding.key)
        .context("sending toggle key")?;
    expect_pane_count(session, baseline + 1, binding.timeout, "toggle on")?;

    let value = session.get_global_variable(&binding.variable);
    if is_unset(&value) {
        bail!(
            "toggle on: {} should be set, got {value:?}\n{}",
            binding.variable,
            diagnostics(session)
        );
    }
    let panes = session.list_panes()?;
    if !panes.iter().any(|p| p.as_str() == value) {
        bail!(
            "toggle on: {} = {value:?} is not in pane list {panes:?}",
            binding.variable
        );
    }
    log_event(&format!("[toggle] on: {} = {value}", binding.variable));
    Ok(ToggleReport {
        baseline_panes: baseline,
        toggled_pane: value,
    })
}

/// Press the binding again and check the pane and the variable are gone.
pub fn toggle_off(session: &mut TmuxSession, binding: &ToggleBinding, expected_panes: usize) -> Result<()> {
    session
        .send_prefix_key(&binding.key)
        .context("sending toggle key")?;
    expect_pane_count(session, expected_panes, binding.timeout, "toggle off")?;

    let value = session.get_global_variable(&binding.variable);
    if !is_unset(&value) {
        bail!(
            "toggle off: {} should be cleared, got {value:?}",
            binding.variable
        );
    }
    log_event(&format!("[toggle] off: {} cleared", binding.variable));
    Ok(())
}

/// On, off, `cycles` times. The pane count must return to where it started.
pub fn toggle_cycles(session: &mut TmuxSession, binding: &ToggleBinding, cycles: u32) -> Result<()> {
    for cycle in 1..=cycles {
        let report = toggle_on(session, binding).with_context(|| format!("cycle {cycle}"))?;
        toggle_off(session, binding, report.baseline_panes)
            .with_context(|| format!("cycle {cycle}"))?;
    }
    Ok(())
}

/// Toggle pane coexists with user splits and pane switching.
///
/// Split, toggle on, switch panes with prefix+`o`, split the now-active pane:
/// the pane count tracks only the splits and the recorded toggle pane never
/// changes.
pub fn split_independence(session: &mut TmuxSession, binding: &ToggleBinding) -> Result<()> {
    let start = session.pane_count()?;

    session.split_pane(SplitAxis::Horizontal, None)?;
    sleep(session.config().split_settle());
    expect_pane_count(session, start + 1, binding.timeout, "split")?;

    let report = toggle_on(session, binding)?;
    if report.baseline_panes != start + 1 {
        bail!("toggle on started from {} panes, expected {}", report.baseline_panes, start + 1);
    }

    session.send_prefix_key("o").context("switching pane")?;
    expect_pane_count(session, start + 2, binding.timeout, "after pane switch")?;

    // The active pane: index numbering follows the config's pane-base-index.
    session.split_pane(SplitAxis::Horizontal, None)?;
    sleep(session.config().split_settle());
    expect_pane_count(session, start + 3, binding.timeout, "split with toggle pane active")?;
    let after_split = session.get_global_variable(&binding.variable);
    if after_split != report.toggled_pane {
        bail!(
            "split changed {}: {:?} -> {after_split:?}",
            binding.variable,
            report.toggled_pane
        );
    }

    toggle_off(session, binding, start + 2)
}

/// Expected outcome of one validator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Rejected with a message containing this text.
    Reject(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorCase {
    pub input: &'static str,
    pub verdict: Verdict,
}

/// Documented project-name rules: non-empty, no `/`, no leading `.`.
pub fn project_name_cases() -> Vec<ValidatorCase> {
    vec![
        ValidatorCase {
            input: "",
            verdict: Verdict::Reject("cannot be empty"),
        },
        ValidatorCase {
            input: "my/project",
            verdict: Verdict::Reject("cannot contain '/'"),
        },
        ValidatorCase {
            input: ".hidden",
            verdict: Verdict::Reject("cannot start with '.'"),
        },
        ValidatorCase {
            input: "myproject",
            verdict: Verdict::Accept,
        },
    ]
}

/// Run `function` from `script` against every case; error lists each mismatch.
pub fn check_validator(script: &ShellScript, function: &str, cases: &[ValidatorCase]) -> Result<()> {
    let mut failures = Vec::new();
    for case in cases {
        let out = script
            .call(function, &[case.input])
            .with_context(|| format!("calling {function} {:?}", case.input))?;
        let message = format!("{}{}", out.stderr, out.stdout);
        let ok = match &case.verdict {
            Verdict::Accept => out.success(),
            Verdict::Reject(fragment) => !out.success() && message.contains(fragment),
        };
        if ok {
            log_event(&format!("[validate] {:?}: ok", case.input));
        } else {
            failures.push(format!(
                "{:?}: expected {:?}, got exit {:?} with {:?}",
                case.input,
                case.verdict,
                out.code,
                message.trim()
            ));
        }
    }
    if !failures.is_empty() {
        bail!("{function} failed {} case(s):\n{}", failures.len(), failures.join("\n"));
    }
    Ok(())
}
