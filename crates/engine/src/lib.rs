// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fieldhand engine: unit supervision and the runtime surface
//!
//! The host side is [`RuntimeEngine`] over an [`Orchestrator`]; the unit side
//! is [`run_unit`], which every execution unit runs regardless of kind.

mod collab;
mod error;
mod events;
mod logs;
mod orchestrator;
mod runtime;
mod unit;

pub use collab::{
    AccountRegistry, ConfigProvider, GuardedConfigProvider, RuntimeSink, StaticAccounts,
    StaticConfigProvider,
};
pub use error::{RuntimeError, UnitCallError, UnitError};
pub use events::{EventBus, RuntimeEvent};
pub use logs::{LogFilter, LogStore, ACCOUNT_LOG_CAPACITY, GLOBAL_LOG_CAPACITY};
pub use orchestrator::{ExitRecord, Orchestrator, OrchestratorConfig, UnitInfo, UnitState};
pub use runtime::{RuntimeEngine, SchedulerStatus, StartSummary, JOBS_NAMESPACE};
pub use unit::{run_unit, NullApi, UnitApi, UnitContext, UnitLogger, UnitOptions, UnitStatus};
