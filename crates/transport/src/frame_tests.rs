// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn login_request() -> Frame {
    Frame::request(
        "gamepb.userpb.UserService",
        "Login",
        1,
        0,
        Bytes::from_static(b"{\"code\":\"abc\"}"),
    )
}

#[test]
fn request_survives_the_wire() {
    let frame = login_request();
    let bytes = frame.encode().unwrap();
    assert_eq!(bytes[0], FRAME_VERSION);
    assert_eq!(bytes[1], MessageKind::Request as u8);
    assert_eq!(Frame::decode(&bytes).unwrap(), frame);
}

#[test]
fn error_reply_keeps_correlation_fields() {
    let request = login_request();
    let reply = Frame::error_to(&request.meta, 42, 1003, "code expired");
    let decoded = Frame::decode(&reply.encode().unwrap()).unwrap();

    assert_eq!(decoded.meta.kind, MessageKind::Response);
    assert_eq!(decoded.meta.client_seq, 1);
    assert_eq!(decoded.meta.server_seq, 42);
    assert_eq!(decoded.meta.error_code, 1003);
    assert_eq!(decoded.meta.error_message, "code expired");
    assert_eq!(decoded.meta.method_key(), "gamepb.userpb.UserService.Login");
}

#[parameterized(
    empty = { 0 },
    inside_header = { 10 },
    inside_service = { 30 },
    missing_last_byte = { usize::MAX },
)]
fn truncated_frames_are_rejected(cut: usize) {
    let bytes = login_request().encode().unwrap();
    let cut = cut.min(bytes.len() - 1);
    assert!(matches!(
        Frame::decode(&bytes[..cut]),
        Err(FrameError::Truncated { .. })
    ));
}

#[test]
fn unknown_kind_and_version_are_rejected() {
    let mut bytes = login_request().encode().unwrap().to_vec();
    bytes[1] = 9;
    assert_eq!(Frame::decode(&bytes), Err(FrameError::UnknownKind(9)));

    bytes[0] = 7;
    assert_eq!(Frame::decode(&bytes), Err(FrameError::UnsupportedVersion(7)));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = login_request().encode().unwrap().to_vec();
    bytes.extend_from_slice(b"xx");
    assert_eq!(Frame::decode(&bytes), Err(FrameError::TrailingBytes(2)));
}

#[test]
fn oversized_method_name_fails_to_encode() {
    let frame = Frame::request("svc", "m".repeat(70_000), 1, 0, Bytes::new());
    assert!(matches!(
        frame.encode(),
        Err(FrameError::TooLong { field: "method", .. })
    ));
}
