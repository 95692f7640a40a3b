// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    kickout = { "gamepb.userpb.Kickout", PushChannel::Kickout },
    lands = { "gamepb.plantpb.LandsNotify", PushChannel::Lands },
    items = { "gamepb.itempb.ItemNotify", PushChannel::Items },
    basic = { "gamepb.userpb.BasicNotify", PushChannel::Basic },
    friend_application = { "gamepb.friendpb.FriendApplicationReceivedNotify", PushChannel::FriendApplication },
    friend_added = { "gamepb.friendpb.FriendAddedNotify", PushChannel::FriendAdded },
    goods = { "gamepb.shoppb.GoodsUnlockNotify", PushChannel::GoodsUnlock },
    task_info = { "gamepb.taskpb.TaskInfoNotify", PushChannel::TaskInfo },
    bare_tag = { "LandsNotify", PushChannel::Lands },
)]
fn tags_map_to_channels(tag: &str, expected: PushChannel) {
    let body = PushEvent::encode(tag, b"payload").unwrap();
    let event = PushEvent::decode(&body).unwrap();
    assert_eq!(event.channel(), Some(expected));
    assert_eq!(event.tag(), tag);
}

#[test]
fn unknown_tags_decode_without_error() {
    let body = PushEvent::encode("gamepb.mailpb.MailNotify", b"").unwrap();
    let event = PushEvent::decode(&body).unwrap();
    assert_eq!(
        event,
        PushEvent::Unknown {
            tag: "gamepb.mailpb.MailNotify".to_string()
        }
    );

    let dispatcher = PushDispatcher::new();
    dispatcher.on(PushChannel::Lands, |_| panic!("must not run"));
    assert_eq!(dispatcher.dispatch(&event), 0);
}

#[test]
fn handlers_run_in_registration_order() {
    let dispatcher = PushDispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second"] {
        let seen = Arc::clone(&seen);
        dispatcher.on(PushChannel::Items, move |event| {
            seen.lock().unwrap().push((label, event.tag().to_string()));
        });
    }
    dispatcher.on(PushChannel::Lands, |_| panic!("wrong channel"));

    let body = PushEvent::encode("ItemNotify", b"gold+10").unwrap();
    let event = PushEvent::decode(&body).unwrap();
    assert_eq!(dispatcher.dispatch(&event), 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "first");
    assert_eq!(seen[1].0, "second");
}

#[test]
fn payload_is_kept_verbatim() {
    let body = PushEvent::encode("TaskInfoNotify", &[1, 2, 3]).unwrap();
    match PushEvent::decode(&body).unwrap() {
        PushEvent::Known { payload, .. } => assert_eq!(&payload[..], &[1, 2, 3]),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn empty_body_is_a_decode_error() {
    assert!(PushEvent::decode(&[]).is_err());
}
