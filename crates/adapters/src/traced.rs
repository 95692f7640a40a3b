// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::notify::{Notice, NotifyAdapter, NotifyError};
use crate::source::{ConfigSource, SourceError};
use crate::unit::{ExecutionUnitFactory, LaunchError, UnitHandle, UnitKind, UnitSpec};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any ExecutionUnitFactory
#[derive(Clone)]
pub struct TracedUnitFactory<F> {
    inner: F,
}

impl<F> TracedUnitFactory<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: ExecutionUnitFactory> ExecutionUnitFactory for TracedUnitFactory<F> {
    fn kind(&self) -> UnitKind {
        self.inner.kind()
    }

    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError> {
        let span = tracing::info_span!(
            "unit.launch",
            account_id = %spec.account.id,
            kind = %self.inner.kind()
        );

        async move {
            tracing::info!(revision = spec.config.revision, "starting");

            // Precondition: a unit without an account id cannot be addressed
            if spec.account.id.is_empty() {
                tracing::error!("account id is empty");
                return Err(LaunchError::Rejected("account id is empty".to_string()));
            }

            let start = std::time::Instant::now();
            let result = self.inner.launch(spec).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(handle) => tracing::info!(
                    pid = handle.pid,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "unit launched"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "launch failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any ConfigSource
#[derive(Clone)]
pub struct TracedConfigSource<S> {
    inner: S,
}

impl<S> TracedConfigSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ConfigSource> ConfigSource for TracedConfigSource<S> {
    async fn fetch(&self, account_id: &str) -> Result<Option<serde_json::Value>, SourceError> {
        let span = tracing::debug_span!("config.fetch", account_id);

        async move {
            let start = std::time::Instant::now();
            let result = self.inner.fetch(account_id).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(found) => tracing::debug!(found = found.is_some(), elapsed_ms, "fetched"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "fetch failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any NotifyAdapter
#[derive(Clone)]
pub struct TracedNotifyAdapter<N> {
    inner: N,
}

impl<N> TracedNotifyAdapter<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: NotifyAdapter> NotifyAdapter for TracedNotifyAdapter<N> {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let result = self.inner.send(notice).await;
        match &result {
            Ok(()) => tracing::info!(account_id = %notice.account_id, title = %notice.title, "notified"),
            Err(e) => tracing::warn!(account_id = %notice.account_id, error = %e, "notify failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
