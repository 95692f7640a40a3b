//! Daemon lifecycle specs
//!
//! Verify start, control requests, and shutdown of `fhd run`.

use crate::prelude::*;

const ONE_ACCOUNT: &str = "[[accounts]]\nid = \"farm-1\"\nname = \"North Farm\"\ncode = \"abc\"\n";

#[test]
fn run_creates_state_files() {
    let sandbox = Sandbox::empty();
    let _daemon = sandbox.start_daemon();

    assert!(sandbox.socket_path().exists());
    assert_eq!(
        sandbox.read("state/daemon.version"),
        env!("CARGO_PKG_VERSION")
    );
    assert!(!sandbox.read("state/daemon.pid").trim().is_empty());
    assert!(sandbox
        .read("state/daemon.log")
        .contains("--- fhd: starting (pid: "));
}

#[test]
fn ctl_ping_and_status() {
    let sandbox = Sandbox::with_settings(ONE_ACCOUNT);
    let _daemon = sandbox.start_daemon();

    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"ping"}"#])
        .passes()
        .stdout_has("pong");

    let status = sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"status"}"#])
        .passes()
        .json();
    assert_eq!(status["type"], "status");
    assert_eq!(status["mode"], "thread");
    assert_eq!(status["accounts"], 1);
    assert_eq!(status["units"], serde_json::json!([]));
}

#[test]
fn ctl_error_response_exits_non_zero() {
    let sandbox = Sandbox::empty();
    let _daemon = sandbox.start_daemon();

    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"start_account","account_id":"ghost"}"#])
        .fails()
        .stderr_has("account not found: ghost");
}

#[test]
fn breaker_status_needs_a_config_source() {
    let sandbox = Sandbox::empty();
    let _daemon = sandbox.start_daemon();

    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"breaker_status"}"#])
        .fails()
        .stderr_has("config source not configured");
}

#[test]
fn second_daemon_refuses_to_start() {
    let sandbox = Sandbox::empty();
    let _daemon = sandbox.start_daemon();

    sandbox
        .fhd()
        .args(&["run"])
        .fails()
        .stderr_has("daemon already running");
    // The first daemon still answers
    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"ping"}"#])
        .passes();
}

#[test]
fn shutdown_request_stops_daemon_and_cleans_up() {
    let sandbox = Sandbox::empty();
    let mut daemon = sandbox.start_daemon();

    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"shutdown"}"#])
        .passes()
        .stdout_has("shutting_down");

    assert!(daemon.wait_exit(), "daemon should exit after shutdown");
    assert!(!sandbox.socket_path().exists());
    assert!(!sandbox.state_path().join("daemon.pid").exists());
}
