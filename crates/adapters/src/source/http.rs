// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ConfigSource, SourceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Base URL; configs are read from `{base_url}/accounts/{id}/config`
    pub base_url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl HttpSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: default_timeout(),
        }
    }
}

/// Reads account configuration over HTTP
#[derive(Clone)]
pub struct HttpConfigSource {
    base_url: Arc<str>,
    agent: ureq::Agent,
}

impl HttpConfigSource {
    pub fn new(config: &HttpSourceConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();
        Self {
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            agent,
        }
    }

    pub fn url_for(&self, account_id: &str) -> String {
        format!("{}/accounts/{}/config", self.base_url, account_id)
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self, account_id: &str) -> Result<Option<serde_json::Value>, SourceError> {
        let url = self.url_for(account_id);
        let agent = self.agent.clone();

        // ureq is blocking
        tokio::task::spawn_blocking(move || {
            let mut response = match agent.get(&url).call() {
                Ok(response) => response,
                Err(ureq::Error::StatusCode(404)) => return Ok(None),
                Err(ureq::Error::StatusCode(code)) => return Err(SourceError::Status(code)),
                Err(e) => return Err(SourceError::Unavailable(e.to_string())),
            };
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| SourceError::Unavailable(format!("failed to read response: {}", e)))?;
            if body.trim().is_empty() {
                return Ok(None);
            }
            serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| SourceError::Malformed(e.to_string()))
        })
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
