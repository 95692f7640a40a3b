// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host maintenance jobs on the engine's `system-jobs` namespace

use std::convert::Infallible;
use std::sync::Arc;

use fh_adapters::{ExecutionUnitFactory, NotifyAdapter};
use fh_core::{BreakerState, CircuitBreaker, RecurringOptions, SchedulerError};
use fh_engine::RuntimeEngine;
use serde::Serialize;

use crate::settings::JobSettings;

pub const FLEET_SUMMARY_TASK: &str = "fleet-summary";
pub const CONFIG_REFRESH_TASK: &str = "config-refresh";

/// Point-in-time fleet counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub accounts: usize,
    pub running: usize,
    pub crashed: usize,
    pub breaker: Option<BreakerState>,
}

pub fn fleet_summary<F, N>(
    engine: &RuntimeEngine<F, N>,
    breaker: Option<&CircuitBreaker>,
) -> FleetSummary
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    FleetSummary {
        accounts: engine.accounts().list_accounts().len(),
        running: engine.orchestrator().live_count(),
        crashed: engine.orchestrator().crashed_count(),
        breaker: breaker.map(CircuitBreaker::state),
    }
}

/// Register the maintenance jobs. Re-installing replaces the previous timers.
pub fn install<F, N>(
    engine: &Arc<RuntimeEngine<F, N>>,
    breaker: Option<Arc<CircuitBreaker>>,
    settings: &JobSettings,
) -> Result<(), SchedulerError>
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    let jobs = engine.jobs();

    let summary_engine = Arc::clone(engine);
    jobs.set_recurring(
        FLEET_SUMMARY_TASK,
        settings.fleet_summary,
        RecurringOptions::default(),
        move || {
            let summary = fleet_summary(&summary_engine, breaker.as_deref());
            async move {
                tracing::info!(
                    accounts = summary.accounts,
                    running = summary.running,
                    crashed = summary.crashed,
                    breaker = ?summary.breaker,
                    "fleet summary"
                );
                Ok::<(), Infallible>(())
            }
        },
    )?;

    match settings.config_refresh {
        Some(interval) => {
            let refresh_engine = Arc::clone(engine);
            jobs.set_recurring(
                CONFIG_REFRESH_TASK,
                interval,
                RecurringOptions::default(),
                move || {
                    let engine = Arc::clone(&refresh_engine);
                    async move {
                        let delivered = engine.broadcast_config(None).await;
                        tracing::debug!(delivered, "config refresh pushed");
                        Ok::<(), Infallible>(())
                    }
                },
            )?;
        }
        None => {
            jobs.cancel(CONFIG_REFRESH_TASK);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
