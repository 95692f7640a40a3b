// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime engine: the only surface the admin layer talks to.
//!
//! Composes the orchestrator, the canonical event bus, the log buffers, and
//! the host-side scheduler registry. Holds no unit state of its own.

use crate::collab::{AccountRegistry, ConfigProvider, RuntimeSink};
use crate::error::{RuntimeError, UnitCallError};
use crate::events::{EventBus, RuntimeEvent};
use crate::logs::{LogFilter, LogStore};
use crate::orchestrator::{ExitRecord, Orchestrator, OrchestratorConfig, UnitInfo};
use fh_adapters::{ExecutionUnitFactory, NotifyAdapter, UnitKind};
use fh_core::{LogEntry, RegistrySnapshot, Scheduler, SchedulerRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Namespace for host-side maintenance jobs
pub const JOBS_NAMESPACE: &str = "system-jobs";

/// Outcome of a bulk start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSummary {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    /// Account id and error text
    pub failed: Vec<(String, String)>,
}

/// Scheduler view for one account: host jobs plus the unit's own timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub account_id: String,
    pub running: bool,
    pub host: RegistrySnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_error: Option<String>,
}

pub struct RuntimeEngine<F, N> {
    orchestrator: Orchestrator<F, N>,
    accounts: Arc<dyn AccountRegistry>,
    logs: Arc<LogStore>,
    registry: SchedulerRegistry,
}

impl<F: ExecutionUnitFactory, N: NotifyAdapter> RuntimeEngine<F, N> {
    pub fn new(
        factory: F,
        notify: N,
        accounts: Arc<dyn AccountRegistry>,
        configs: Arc<dyn ConfigProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let bus = EventBus::new();
        let logs = Arc::new(LogStore::new());
        bus.add_sink(Arc::clone(&logs) as Arc<dyn RuntimeSink>);
        let orchestrator = Orchestrator::new(factory, notify, configs, bus, config);
        tracing::info!(kind = %orchestrator.kind(), "runtime engine ready");
        Self {
            orchestrator,
            accounts,
            logs,
            registry: SchedulerRegistry::new(),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.orchestrator.kind()
    }

    pub fn orchestrator(&self) -> &Orchestrator<F, N> {
        &self.orchestrator
    }

    pub fn accounts(&self) -> &Arc<dyn AccountRegistry> {
        &self.accounts
    }

    /// Start a unit for every registered account.
    ///
    /// A failed launch is recorded and does not stop the others.
    pub async fn start_all_accounts(&self) -> StartSummary {
        let accounts = self.accounts.list_accounts();
        tracing::info!(count = accounts.len(), "starting all accounts");

        let results = futures::future::join_all(accounts.into_iter().map(|account| {
            let orchestrator = self.orchestrator.clone();
            async move {
                let id = account.id.clone();
                (id, orchestrator.start(account).await)
            }
        }))
        .await;

        let mut summary = StartSummary::default();
        for (id, result) in results {
            match result {
                Ok(true) => summary.started.push(id),
                Ok(false) => summary.already_running.push(id),
                Err(e) => summary.failed.push((id, e.to_string())),
            }
        }
        summary
    }

    pub fn stop_all_accounts(&self) -> usize {
        let stopped = self.orchestrator.stop_all();
        tracing::info!(stopped, "stopped all accounts");
        stopped
    }

    pub async fn restart_all_accounts(&self) -> StartSummary {
        self.stop_all_accounts();
        self.start_all_accounts().await
    }

    pub async fn start_account(&self, account_id: &str) -> Result<bool, RuntimeError> {
        let account = self.lookup(account_id)?;
        self.orchestrator.start(account).await
    }

    /// Returns false when no unit was live for the account
    pub fn stop_account(&self, account_id: &str) -> bool {
        self.orchestrator.stop(account_id)
    }

    /// Restart with the registry's current view of the account
    pub async fn restart_account(&self, account_id: &str) -> Result<bool, RuntimeError> {
        let account = self.lookup(account_id)?;
        self.orchestrator.restart(account).await
    }

    pub fn is_account_running(&self, account_id: &str) -> bool {
        self.orchestrator.is_running(account_id)
    }

    /// Host scheduler snapshot plus the unit's `getSchedulers` answer.
    ///
    /// A unit that is down or fails to answer yields `unit_error` instead of
    /// an error for the whole request.
    pub async fn scheduler_status(&self, account_id: &str) -> SchedulerStatus {
        let running = self.orchestrator.is_running(account_id);
        let (unit, unit_error) = if running {
            match self
                .orchestrator
                .call_unit_api(account_id, "getSchedulers", Vec::new())
                .await
            {
                Ok(snapshot) => (Some(snapshot), None),
                Err(e) => (None, Some(e.to_string())),
            }
        } else {
            (None, Some(format!("account {} is not running", account_id)))
        };
        SchedulerStatus {
            account_id: account_id.to_string(),
            running,
            host: self.registry.snapshot(None),
            unit,
            unit_error,
        }
    }

    pub async fn call_unit_api(
        &self,
        account_id: &str,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, UnitCallError> {
        self.orchestrator.call_unit_api(account_id, method, args).await
    }

    pub async fn broadcast_config(&self, target: Option<&str>) -> usize {
        self.orchestrator.broadcast_config(target).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.orchestrator.bus().subscribe()
    }

    pub fn add_sink(&self, sink: Arc<dyn RuntimeSink>) {
        self.orchestrator.bus().add_sink(sink);
    }

    pub fn logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.logs.global(filter)
    }

    pub fn account_logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.logs.account(filter)
    }

    pub fn units(&self) -> Vec<UnitInfo> {
        self.orchestrator.units()
    }

    pub fn last_exit(&self, account_id: &str) -> Option<ExitRecord> {
        self.orchestrator.last_exit(account_id)
    }

    /// Host-side maintenance namespace
    pub fn jobs(&self) -> Scheduler {
        self.registry.scheduler(JOBS_NAMESPACE)
    }

    pub fn scheduler_registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    /// Cancel host jobs, stop every unit, and wait for the units to exit
    /// within the configured shutdown grace
    pub async fn shutdown(&self) -> usize {
        for namespace in self.registry.namespaces() {
            self.registry.scheduler(namespace).cancel_all();
        }
        let grace = self.orchestrator.config().shutdown_grace;
        let stopped = self.orchestrator.stop_all_and_wait(grace).await;
        tracing::info!(stopped, "runtime shut down");
        stopped
    }

    fn lookup(&self, account_id: &str) -> Result<fh_core::Account, RuntimeError> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| RuntimeError::AccountNotFound(account_id.to_string()))
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
