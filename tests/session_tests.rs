//! Session lifecycle tests against a real tmux server.
//!
//! Sessions run with no tmux config (`-f /dev/null`) on a server of their own,
//! so results depend neither on the machine's `~/.tmux.conf` nor on a tmux
//! server the developer already has running. Tests are serialized anyway:
//! the shared-socket cases do share one server and its global variables.
//!
//! Run with: `cargo test --test session_tests -- --nocapture`

mod common;

use common::{WAIT, init_test_logging, minimal_options, test_config, tmux_or_skip};
use muxprobe::globals::{HELP_PANE_ID, is_unset};
use muxprobe::polling::{PollSettings, poll_until};
use muxprobe::readiness::{ReadinessProbe, TmuxShellChannel, marker_executed};
use muxprobe::session::kill_orphans;
use muxprobe::{
    ConfigSource, HarnessError, PaneTarget, SessionFixture, SessionState, SplitAxis, TmuxControl,
    TmuxSession,
};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn test_new_session_has_one_pane() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let session = TmuxSession::create(minimal_options()).unwrap();
    assert_eq!(session.state(), SessionState::Attached);
    assert!(session.control().has_session(&format!("={}", session.name())));
    assert_eq!(session.pane_count().unwrap(), 1);
}

#[test]
#[serial]
fn test_split_adds_pane_with_returned_id() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    let new_pane = fixture.split_pane(SplitAxis::Vertical, None).unwrap();

    assert!(fixture.wait_for_pane_count(2, WAIT));
    let panes = fixture.list_panes().unwrap();
    assert!(panes.contains(&new_pane), "{new_pane} not in {panes:?}");

    // Splitting a specific pane by id works too
    fixture
        .split_pane(SplitAxis::Horizontal, Some(&PaneTarget::from(&new_pane)))
        .unwrap();
    assert!(fixture.wait_for_pane_count(3, WAIT));
}

#[test]
#[serial]
fn test_split_of_missing_pane_fails() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    let err = fixture
        .split_pane(SplitAxis::Horizontal, Some(&PaneTarget::Index(99)))
        .unwrap_err();
    assert!(matches!(err, HarnessError::SplitFailed(_)), "got {err:?}");
    assert_eq!(fixture.pane_count().unwrap(), 1);
}

#[test]
#[serial]
fn test_send_line_output_is_captured() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    fixture.send_line("echo captured-$((6 * 7))").unwrap();
    assert!(
        fixture.wait_for_text("captured-42", WAIT, None),
        "pane content:\n{}",
        fixture.capture_pane(None, true).unwrap_or_default()
    );
}

#[test]
#[serial]
fn test_wait_for_text_gives_up() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    assert!(!fixture.wait_for_text("text-that-never-appears", Duration::from_millis(300), None));
}

#[test]
#[serial]
fn test_raw_keys_reach_the_shell() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let mut fixture = SessionFixture::from_options(minimal_options()).unwrap();
    fixture.send_raw(b"echo raw-$((1 + 1))-path\r").unwrap();
    assert!(fixture.wait_for_text("raw-2-path", WAIT, None));
}

#[test]
#[serial]
fn test_pane_geometry_queries() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    let height = fixture.pane_height(None).unwrap();
    assert!(height > 0 && height <= test_config().height, "height {height}");
    fixture.status_bar_text().unwrap();
}

#[test]
#[serial]
fn test_global_variable_round_trip() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let fixture = SessionFixture::from_options(minimal_options()).unwrap();
    fixture.set_global_variable("@muxprobe_test", "%7").unwrap();
    assert_eq!(fixture.get_global_variable("@muxprobe_test"), "%7");

    fixture.set_global_variable("@muxprobe_test", "").unwrap();
    assert!(is_unset(&fixture.get_global_variable("@muxprobe_test")));
    assert!(is_unset(&fixture.get_global_variable("@muxprobe_never_set")));
}

#[test]
#[serial]
fn test_teardown_is_idempotent_and_clears_state() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let mut session = TmuxSession::create(minimal_options()).unwrap();
    let exact = format!("={}", session.name());
    let control = session.control().clone();
    session.set_global_variable(HELP_PANE_ID, "%99").unwrap();

    session.teardown();
    session.teardown();

    assert!(session.is_cleaned_up());
    assert_eq!(session.state(), SessionState::TornDown);
    assert!(!control.has_session(&exact));
    assert!(is_unset(&control.show_global(HELP_PANE_ID)));
    assert!(matches!(session.pane_count(), Err(HarnessError::NotStarted)));
}

#[test]
#[serial]
fn test_fixture_drop_kills_session() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let (exact, control) = {
        let fixture = SessionFixture::from_options(minimal_options()).unwrap();
        (format!("={}", fixture.name()), fixture.control().clone())
    };
    assert!(!control.has_session(&exact));
}

#[test]
#[serial]
fn test_fixture_cleans_up_after_panic() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let seen = std::sync::Mutex::new(None);
    let result = std::panic::catch_unwind(|| {
        SessionFixture::with_session(minimal_options(), |session| {
            *seen.lock().unwrap() = Some((session.name().to_string(), session.control().clone()));
            panic!("test body failed");
        })
    });
    assert!(result.is_err());

    let (name, control) = seen.into_inner().unwrap().expect("body ran");
    assert!(!control.has_session(&format!("={name}")));
}

#[test]
#[serial]
fn test_control_only_session_skips_pty() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let mut session = TmuxSession::create(minimal_options().without_pty()).unwrap();
    assert_eq!(session.pane_count().unwrap(), 1);
    assert!(matches!(
        session.send_prefix_key("h"),
        Err(HarnessError::NotStarted)
    ));
}

#[test]
#[serial]
fn test_kill_orphans_only_touches_prefix() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let orphan = TmuxSession::create(
        minimal_options()
            .without_pty()
            .with_name(format!("muxprobe-orphan-{}", std::process::id())),
    )
    .unwrap();
    let bystander = TmuxSession::create(
        minimal_options()
            .without_pty()
            .with_name(format!("bystander-{}", std::process::id())),
    )
    .unwrap();

    // Scoped to this process: the socket directory outlives earlier runs
    let prefix = format!("muxprobe-orphan-{}", std::process::id());
    let killed = kill_orphans(&test_config(), &prefix).unwrap();
    assert_eq!(killed, vec![orphan.name().to_string()]);
    assert!(!orphan.control().has_session(&format!("={}", orphan.name())));
    assert!(bystander.control().has_session(&format!("={}", bystander.name())));
}

#[test]
#[serial]
fn test_readiness_probe_sees_real_shell() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let control = TmuxControl::on_socket(
        &config.tmux_binary,
        dir.path().join("ready.sock"),
        config.timeout(),
    );
    let name = muxprobe::session::generate_session_name("muxprobe-ready");
    control
        .new_session(&name, config.width, config.height, ConfigSource::Empty.path())
        .unwrap();

    let pane = format!("={name}:");
    let probe = ReadinessProbe {
        max_attempts: 30,
        ..ReadinessProbe::default()
    };
    let ready = probe.run(&TmuxShellChannel::new(&control, &pane));

    // The screen is cleared once the marker is seen
    let settings = PollSettings::new(WAIT, Duration::from_millis(50));
    let cleared = poll_until(settings, || {
        control.capture_pane(&pane, None).is_ok_and(|screen| {
            !screen
                .lines()
                .any(|line| marker_executed(line, &probe.marker))
        })
    });
    control.kill_session(&format!("={name}")).unwrap();
    assert!(ready, "shell in {name} never echoed the marker");
    assert!(cleared, "marker output still on screen in {name}");
}

// =============================================================================
// Server isolation
// =============================================================================

/// A tmux config that records `value` in a global option.
fn marking_config(dir: &std::path::Path, value: &str) -> ConfigSource {
    let path = dir.join(format!("{value}.conf"));
    std::fs::write(&path, format!("set -g @muxprobe_cfg {value}\n")).unwrap();
    ConfigSource::User(path)
}

#[test]
#[serial]
fn test_concurrent_sessions_keep_their_own_config() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let first =
        SessionFixture::with_config(marking_config(dir.path(), "first"), test_config()).unwrap();
    // Starts while the first session's server is still running
    let second =
        SessionFixture::with_config(marking_config(dir.path(), "second"), test_config()).unwrap();

    assert_ne!(first.control().socket(), second.control().socket());
    assert_eq!(first.get_global_variable("@muxprobe_cfg"), "first");
    assert_eq!(second.get_global_variable("@muxprobe_cfg"), "second");
}

#[test]
#[serial]
fn test_shared_server_sources_later_config() {
    if !tmux_or_skip() {
        return;
    }
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let shared = muxprobe::HarnessConfig {
        socket_dir: Some(dir.path().to_path_buf()),
        socket_name: Some("shared".to_string()),
        ..test_config()
    };
    let first =
        SessionFixture::with_config(marking_config(dir.path(), "first"), shared.clone()).unwrap();
    assert_eq!(first.get_global_variable("@muxprobe_cfg"), "first");

    let second =
        SessionFixture::with_config(marking_config(dir.path(), "second"), shared).unwrap();
    assert_eq!(first.control().socket(), second.control().socket());
    // tmux ignores -f once the server is up; the config must still apply
    assert_eq!(second.get_global_variable("@muxprobe_cfg"), "second");
}
