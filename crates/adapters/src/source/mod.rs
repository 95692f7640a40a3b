// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote per-account configuration sources.
//!
//! This is the fragile dependency the engine guards with a circuit breaker,
//! so errors here are expected and must stay cheap to produce.

mod http;

pub use http::{HttpConfigSource, HttpSourceConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeConfigSource;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("config source unavailable: {0}")]
    Unavailable(String),
    #[error("config source answered {0}")]
    Status(u16),
    #[error("malformed config document: {0}")]
    Malformed(String),
}

/// Where account configuration lives
#[async_trait]
pub trait ConfigSource: Clone + Send + Sync + 'static {
    /// Fetch one account's configuration. `Ok(None)` means the source has
    /// nothing stored for the account.
    async fn fetch(&self, account_id: &str) -> Result<Option<serde_json::Value>, SourceError>;
}
