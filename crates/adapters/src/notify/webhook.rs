// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook notify adapter: POSTs each notice as JSON

use super::{Notice, NotifyAdapter, NotifyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct WebhookNotifyAdapter {
    url: Arc<str>,
    agent: ureq::Agent,
}

impl WebhookNotifyAdapter {
    pub fn new(config: &WebhookConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();
        Self {
            url: Arc::from(config.url.as_str()),
            agent,
        }
    }
}

#[async_trait]
impl NotifyAdapter for WebhookNotifyAdapter {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let body =
            serde_json::to_string(notice).map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        let url = Arc::clone(&self.url);
        let agent = self.agent.clone();

        // ureq is blocking
        tokio::task::spawn_blocking(move || {
            match agent
                .post(&*url)
                .header("Content-Type", "application/json")
                .send(body)
            {
                Ok(_) => Ok(()),
                Err(ureq::Error::StatusCode(code)) => Err(NotifyError::Status(code)),
                Err(e) => Err(NotifyError::SendFailed(e.to_string())),
            }
        })
        .await
        .map_err(|e| NotifyError::SendFailed(e.to_string()))?
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
