// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport error types

use thiserror::Error;

use crate::link::LinkError;

/// Failure of a single call. Never takes the connection down.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("connection not open: {method}")]
    NotConnected { method: String },
    #[error("disconnected while queued: {method}")]
    Disconnected { method: String },
    #[error("send discarded: {method}")]
    Discarded { method: String },
    #[error("send failed: {method}")]
    SendFailed { method: String },
    #[error("request timed out: {method} (seq={seq}, pending={pending})")]
    Timeout {
        method: String,
        seq: u64,
        pending: usize,
    },
    #[error("{method} error: code={code} {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },
    #[error("connection stale, pending call dropped")]
    Stale,
    #[error("transport shut down")]
    Shutdown,
}

impl CallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. } | CallError::Stale)
    }
}

/// Failure to bring a connection up
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("login rejected: code={code} {message}")]
    AuthRejected { code: i64, message: String },
    #[error("login failed: {0}")]
    Login(CallError),
    #[error("transport halted after authentication failure")]
    Halted,
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Authentication-class failures are never retried
    pub fn is_auth(&self) -> bool {
        match self {
            TransportError::AuthRejected { .. } | TransportError::Halted => true,
            TransportError::Link(link) => link.is_auth(),
            _ => false,
        }
    }
}
