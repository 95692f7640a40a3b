// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespaced task scheduler
//!
//! This module provides:
//! - **SchedulerRegistry**: the shared table of namespaces, created once and
//!   handed to every component that needs timers
//! - **Scheduler**: a handle bound to one namespace, used to register
//!   one-shot and recurring tasks
//! - **Snapshots**: read-only views of the registry for operators
//!
//! Each registered task is driven by its own Tokio task. Task bodies run on
//! separate tasks so a slow or failing body never delays sibling timers.

mod registry;
mod snapshot;
mod task;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

pub use registry::{Scheduler, SchedulerRegistry};
pub use snapshot::{NamespaceSnapshot, RegistrySnapshot, TaskSnapshot};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the scheduler's public API.
///
/// Only programmer errors surface here; task-body failures are logged at
/// the task boundary instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    OneShot,
    Recurring,
}

/// Options for [`Scheduler::set_recurring`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurringOptions {
    /// Fire once right away, without moving the first timed tick
    pub run_immediately: bool,
    /// Skip a due tick while the previous invocation is still running
    pub prevent_overlap: bool,
}

impl Default for RecurringOptions {
    fn default() -> Self {
        Self {
            run_immediately: false,
            prevent_overlap: true,
        }
    }
}

impl RecurringOptions {
    pub fn immediately() -> Self {
        Self {
            run_immediately: true,
            ..Self::default()
        }
    }

    pub fn allow_overlap(mut self) -> Self {
        self.prevent_overlap = false;
        self
    }
}
