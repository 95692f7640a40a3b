// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server push events and their dispatcher
//!
//! A Notify frame's body is an envelope `[tag str16][payload]`. The tag is a
//! dotted type name; its last segment selects the event kind.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::frame::{get_str16, put_str16, FrameError};

/// Named channels handlers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushChannel {
    Kickout,
    Lands,
    Items,
    Basic,
    FriendApplication,
    FriendAdded,
    GoodsUnlock,
    TaskInfo,
}

impl PushChannel {
    fn from_tag(tag: &str) -> Option<Self> {
        let short = tag.rsplit('.').next().unwrap_or(tag);
        let channel = match short {
            "Kickout" | "KickoutNotify" => PushChannel::Kickout,
            "LandsNotify" => PushChannel::Lands,
            "ItemNotify" => PushChannel::Items,
            "BasicNotify" => PushChannel::Basic,
            "FriendApplicationReceivedNotify" => PushChannel::FriendApplication,
            "FriendAddedNotify" => PushChannel::FriendAdded,
            "GoodsUnlockNotify" => PushChannel::GoodsUnlock,
            "TaskInfoNotify" => PushChannel::TaskInfo,
            _ => return None,
        };
        Some(channel)
    }
}

/// A decoded push. Payloads stay opaque; only domain logic reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Known {
        channel: PushChannel,
        tag: String,
        payload: Bytes,
    },
    Unknown {
        tag: String,
    },
}

impl PushEvent {
    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        let mut buf = body;
        let tag = get_str16(&mut buf, "push tag")?;
        Ok(match PushChannel::from_tag(&tag) {
            Some(channel) => PushEvent::Known {
                channel,
                tag,
                payload: Bytes::copy_from_slice(buf),
            },
            None => PushEvent::Unknown { tag },
        })
    }

    /// Build a push envelope, as a server would
    pub fn encode(tag: &str, payload: &[u8]) -> Result<Bytes, FrameError> {
        let mut buf = BytesMut::with_capacity(2 + tag.len() + payload.len());
        put_str16(&mut buf, "push tag", tag)?;
        buf.extend_from_slice(payload);
        Ok(buf.freeze())
    }

    pub fn channel(&self) -> Option<PushChannel> {
        match self {
            PushEvent::Known { channel, .. } => Some(*channel),
            PushEvent::Unknown { .. } => None,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            PushEvent::Known { tag, .. } | PushEvent::Unknown { tag } => tag,
        }
    }
}

type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Synchronous publish/subscribe over [`PushChannel`]s.
///
/// Handlers run on the connection's read loop in registration order, so they
/// must return quickly; anything slow should be handed to a task.
#[derive(Clone, Default)]
pub struct PushDispatcher {
    handlers: Arc<Mutex<Vec<(PushChannel, Handler)>>>,
}

impl PushDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, channel: PushChannel, handler: impl Fn(&PushEvent) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel, Arc::new(handler)));
    }

    /// Run every handler for the event's channel, returning how many ran
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        let Some(channel) = event.channel() else {
            tracing::trace!(tag = event.tag(), "ignoring unknown push");
            return 0;
        };
        let matching: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in &matching {
            handler(event);
        }
        matching.len()
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
