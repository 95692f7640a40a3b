// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn login_carries_credentials() {
    let handshake = JsonHandshake::new("1.6.0");
    let credentials = Credentials {
        code: "abc".to_string(),
        open_id: None,
        platform: "qq".to_string(),
    };
    let login = handshake.login(&credentials);
    assert_eq!(login.method_key(), "gamepb.userpb.UserService.Login");
    let body: serde_json::Value = serde_json::from_slice(&login.body).unwrap();
    assert_eq!(body["code"], "abc");
    assert_eq!(body["client_version"], "1.6.0");
}

#[parameterized(
    number = { br#"{"time_now_millis": 1700000000123}"#, Some(1_700_000_000_123) },
    string = { br#"{"time_now_millis": "1700000000123"}"#, Some(1_700_000_000_123) },
    missing = { br#"{}"#, None },
    not_json = { b"\x08\x01", None },
)]
fn login_server_time(body: &[u8], expected: Option<u64>) {
    assert_eq!(JsonHandshake::default().login_server_time(body), expected);
}

#[test]
fn heartbeat_server_time_reads_its_own_field() {
    let handshake = JsonHandshake::default();
    assert_eq!(
        handshake.heartbeat_server_time(br#"{"server_time": 42}"#),
        Some(42)
    );
    assert_eq!(
        handshake.heartbeat_server_time(br#"{"time_now_millis": 42}"#),
        None
    );
}
