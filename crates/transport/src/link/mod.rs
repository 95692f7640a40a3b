// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte-frame links to the game gateway

mod ws;

pub use ws::{GatewayConfig, WsConnector};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeConnector, FakeServer};

use async_trait::async_trait;
use bytes::Bytes;
use fh_core::Credentials;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("gateway rejected connection: HTTP {status} {message}")]
    Rejected { status: u16, message: String },
}

impl LinkError {
    /// 400/401/403 mean the login code itself is bad; retrying cannot help
    pub fn is_auth(&self) -> bool {
        matches!(self, LinkError::Rejected { status: 400 | 401 | 403, .. })
    }
}

/// Something that happened on the inbound side of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(Bytes),
    Closed { code: Option<u16>, reason: String },
    Failed { message: String },
}

/// An open link.
///
/// Dropping `outbound` closes the link. After `Closed` or `Failed` no
/// further events arrive.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Bytes>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens links to the gateway for a set of credentials
#[async_trait]
pub trait Connector: Clone + Send + Sync + 'static {
    async fn open(&self, credentials: &Credentials) -> Result<Link, LinkError>;
}
