// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op notify adapter for when no webhook is configured.

use super::{Notice, NotifyAdapter, NotifyError};
use async_trait::async_trait;

/// Notify adapter that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifyAdapter;

impl NoOpNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for NoOpNotifyAdapter {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        tracing::debug!(account_id = %notice.account_id, title = %notice.title, "notification dropped");
        Ok(())
    }
}
