// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! fh-transport: rate-limited duplex game connection
//!
//! A [`Transport`] turns a byte-frame link into a correlated request/response
//! API with push-event dispatch, a two-lane outbound rate limiter, login,
//! heartbeats, and reconnects.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod limiter;
pub mod link;
mod pending;
pub mod push;
mod transport;

pub use error::{CallError, TransportError};
pub use frame::{Frame, FrameError, FrameMeta, MessageKind};
pub use handshake::{Handshake, JsonHandshake, Outbound};
pub use limiter::{RateLimitConfig, RateLimiter, SendTask};
pub use link::{Connector, GatewayConfig, Link, LinkError, LinkEvent, WsConnector};
pub use push::{PushChannel, PushDispatcher, PushEvent};
pub use transport::{
    ConnectionEvent, Phase, Reply, Transport, TransportConfig, TransportStats,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use link::{FakeConnector, FakeServer};
