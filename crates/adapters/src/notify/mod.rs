// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline notification adapters

mod noop;
mod webhook;

pub use noop::NoOpNotifyAdapter;
pub use webhook::{WebhookConfig, WebhookNotifyAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifyAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from notification delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    SendFailed(String),
    #[error("notification endpoint answered {0}")]
    Status(u16),
}

/// A notification about one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub account_id: String,
    pub account_name: String,
    pub title: String,
    pub message: String,
}

impl Notice {
    /// Unit went away without being asked to
    pub fn offline(account_id: &str, account_name: &str, reason: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            account_name: account_name.to_string(),
            title: format!("Account {} offline", account_name),
            message: format!("account {} ({}) went offline: {}", account_name, account_id, reason),
        }
    }
}

/// Adapter for sending notifications
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}
