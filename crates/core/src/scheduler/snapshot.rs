// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only registry views

use serde::{Deserialize, Serialize};

use super::TaskKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub kind: TaskKind,
    /// Delay for one-shot tasks, period for recurring ones
    pub interval_ms: u64,
    pub created_at_ms: u64,
    pub next_run_at_ms: Option<u64>,
    pub last_run_at_ms: Option<u64>,
    pub run_count: u64,
    pub running: bool,
    pub prevent_overlap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub namespace: String,
    pub created_at_ms: u64,
    pub task_count: usize,
    /// Sorted by task name
    pub tasks: Vec<TaskSnapshot>,
}

impl NamespaceSnapshot {
    pub fn task(&self, name: &str) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub generated_at_ms: u64,
    pub scheduler_count: usize,
    /// Sorted by namespace
    pub schedulers: Vec<NamespaceSnapshot>,
}

impl RegistrySnapshot {
    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceSnapshot> {
        self.schedulers.iter().find(|s| s.namespace == namespace)
    }
}
