//! Error reporting without a running daemon

use crate::prelude::*;

#[test]
fn ctl_without_daemon_fails() {
    let sandbox = Sandbox::empty();
    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"ping"}"#])
        .fails()
        .stderr_has("daemon not running");
}

#[test]
fn ctl_rejects_malformed_request() {
    let sandbox = Sandbox::empty();
    sandbox
        .fhd()
        .args(&["ctl", "ping please"])
        .fails()
        .stderr_has("request must be a JSON control request");
}

#[test]
fn invalid_settings_are_reported() {
    let sandbox = Sandbox::with_settings(
        "[[accounts]]\nid = \"a\"\ncode = \"1\"\n\n[[accounts]]\nid = \"a\"\ncode = \"2\"\n",
    );
    sandbox
        .fhd()
        .args(&["run"])
        .fails()
        .stderr_has("duplicate account id: a");
}

#[test]
fn missing_settings_file_is_reported() {
    let sandbox = Sandbox::empty();
    std::fs::remove_file(sandbox.settings_path()).unwrap();
    sandbox
        .fhd()
        .args(&["ctl", r#"{"type":"ping"}"#])
        .fails()
        .stderr_has("failed to read settings");
}
