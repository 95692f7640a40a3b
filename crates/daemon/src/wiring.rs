// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the runtime engine from settings

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fh_adapters::{
    ExecutionUnitFactory, HttpConfigSource, NoOpNotifyAdapter, Notice, NotifyAdapter, NotifyError,
    TracedConfigSource, TracedNotifyAdapter, TracedUnitFactory, UnitFactory, WebhookNotifyAdapter,
};
use fh_core::{CircuitBreaker, SystemClock};
use fh_engine::{
    AccountRegistry, ConfigProvider, GuardedConfigProvider, RuntimeEngine, StaticAccounts,
    StaticConfigProvider,
};

use crate::settings::Settings;
use crate::units::unit_factory;

/// Breaker name for the remote config source
pub const CONFIG_SOURCE_BREAKER: &str = "config-source";

/// Runtime engine with concrete adapter types (wrapped with tracing)
pub type DaemonEngine = RuntimeEngine<TracedUnitFactory<UnitFactory>, TracedNotifyAdapter<Notifier>>;

/// Notify adapter chosen from settings
#[derive(Clone)]
pub enum Notifier {
    NoOp(NoOpNotifyAdapter),
    Webhook(WebhookNotifyAdapter),
}

impl Notifier {
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.notify {
            Some(config) => Notifier::Webhook(WebhookNotifyAdapter::new(config)),
            None => Notifier::NoOp(NoOpNotifyAdapter::new()),
        }
    }
}

#[async_trait]
impl NotifyAdapter for Notifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        match self {
            Notifier::NoOp(n) => n.send(notice).await,
            Notifier::Webhook(n) => n.send(notice).await,
        }
    }
}

/// An engine plus the breaker guarding its config source, if any
pub struct Assembly<F, N> {
    pub engine: Arc<RuntimeEngine<F, N>>,
    pub breaker: Option<Arc<CircuitBreaker>>,
}

/// Build the daemon's engine for the configured deployment mode
pub fn build_engine(
    settings: &Settings,
    settings_path: Option<&Path>,
) -> Result<Assembly<TracedUnitFactory<UnitFactory>, TracedNotifyAdapter<Notifier>>, std::io::Error>
{
    let factory = TracedUnitFactory::new(unit_factory(settings, settings_path)?);
    let notify = TracedNotifyAdapter::new(Notifier::from_settings(settings));
    Ok(assemble(factory, notify, settings))
}

/// Wire an engine around the given adapters
pub fn assemble<F, N>(factory: F, notify: N, settings: &Settings) -> Assembly<F, N>
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    let accounts: Arc<dyn AccountRegistry> =
        Arc::new(StaticAccounts::new(settings.accounts.clone()));

    let (configs, breaker) = match &settings.config_source {
        Some(source) => {
            let breaker = Arc::new(CircuitBreaker::new(
                CONFIG_SOURCE_BREAKER,
                settings.breaker.clone(),
            ));
            tracing::info!(base_url = %source.base_url, "remote config source enabled");
            let source = TracedConfigSource::new(HttpConfigSource::new(source));
            let provider: GuardedConfigProvider<_, SystemClock> =
                GuardedConfigProvider::new(source, Arc::clone(&breaker));
            (Arc::new(provider) as Arc<dyn ConfigProvider>, Some(breaker))
        }
        None => (
            Arc::new(StaticConfigProvider::new()) as Arc<dyn ConfigProvider>,
            None,
        ),
    };

    let engine = RuntimeEngine::new(
        factory,
        notify,
        accounts,
        configs,
        settings.orchestrator.engine.clone(),
    );
    Assembly {
        engine: Arc::new(engine),
        breaker,
    }
}

#[cfg(test)]
#[path = "wiring_tests.rs"]
mod tests;
