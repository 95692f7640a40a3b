// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of namespaces and the per-namespace scheduler handle

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::snapshot::{NamespaceSnapshot, RegistrySnapshot, TaskSnapshot};
use super::task::{drive_once, drive_recurring, NamespaceStore, Table, TaskEntry, TaskRef};
use super::{RecurringOptions, SchedulerError, TaskKind};
use crate::clock::epoch_ms;

const DEFAULT_NAMESPACE: &str = "default";
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Shared table of scheduler namespaces.
///
/// Create one per process (or per test) and clone it into consumers. When
/// the last clone is dropped every remaining timer is stopped.
#[derive(Clone, Default)]
pub struct SchedulerRegistry {
    table: Arc<Table>,
    generations: Arc<AtomicU64>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `namespace`, creating the namespace if needed.
    ///
    /// An empty namespace maps to `"default"`.
    pub fn scheduler(&self, namespace: impl Into<String>) -> Scheduler {
        let mut namespace = namespace.into();
        if namespace.is_empty() {
            namespace = DEFAULT_NAMESPACE.to_string();
        }
        self.lock()
            .entry(namespace.clone())
            .or_insert_with(NamespaceStore::new);
        Scheduler {
            registry: self.clone(),
            namespace,
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Point-in-time view of one namespace, or of all of them
    pub fn snapshot(&self, namespace: Option<&str>) -> RegistrySnapshot {
        let table = self.lock();
        let schedulers: Vec<NamespaceSnapshot> = table
            .iter()
            .filter(|(ns, _)| namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .map(|(ns, store)| namespace_snapshot(ns, store))
            .collect();
        RegistrySnapshot {
            generated_at_ms: epoch_ms(),
            scheduler_count: schedulers.len(),
            schedulers,
        }
    }

    /// Cancel every task in `namespace` and forget the namespace
    pub fn remove_namespace(&self, namespace: &str) -> bool {
        let removed = self.lock().remove(namespace);
        removed.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, NamespaceStore>> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace any task under `name` and start a driver for the new one,
    /// all under one lock so the old timer can never fire after this returns.
    fn install(
        &self,
        namespace: &str,
        name: String,
        kind: TaskKind,
        period: Duration,
        prevent_overlap: bool,
        spawn_driver: impl FnOnce(TaskRef) -> JoinHandle<()>,
    ) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let task = TaskRef {
            table: Arc::downgrade(&self.table),
            namespace: namespace.to_string(),
            name: name.clone(),
            generation,
        };

        let mut table = self.lock();
        let store = table
            .entry(namespace.to_string())
            .or_insert_with(NamespaceStore::new);
        let mut entry = TaskEntry::new(kind, period, prevent_overlap, generation);
        entry.driver = Some(spawn_driver(task));
        if store.tasks.insert(name.clone(), entry).is_some() {
            tracing::debug!(namespace, task = %name, "replaced existing task");
        }
    }
}

fn namespace_snapshot(namespace: &str, store: &NamespaceStore) -> NamespaceSnapshot {
    let tasks: Vec<TaskSnapshot> = store
        .tasks
        .iter()
        .map(|(name, entry)| entry.snapshot(name))
        .collect();
    NamespaceSnapshot {
        namespace: namespace.to_string(),
        created_at_ms: store.created_at_ms,
        task_count: tasks.len(),
        tasks,
    }
}

/// Scheduler bound to one namespace.
///
/// Registration must happen inside a Tokio runtime. Task bodies return a
/// `Result`; errors and panics are logged and never reach the caller.
#[derive(Clone)]
pub struct Scheduler {
    registry: SchedulerRegistry,
    namespace: String,
}

impl Scheduler {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    /// Run `body` once after `delay`. The entry is removed after it runs,
    /// whether or not it succeeded.
    pub fn set_once<F, Fut, E>(
        &self,
        name: impl Into<String>,
        delay: Duration,
        body: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::EmptyName);
        }
        self.registry.install(
            &self.namespace,
            name,
            TaskKind::OneShot,
            delay,
            false,
            |task| tokio::spawn(drive_once(task, delay, body)),
        );
        Ok(())
    }

    /// Run `body` every `interval` until cancelled or replaced.
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn set_recurring<F, Fut, E>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        options: RecurringOptions,
        body: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::EmptyName);
        }
        let interval = interval.max(MIN_INTERVAL);
        self.registry.install(
            &self.namespace,
            name,
            TaskKind::Recurring,
            interval,
            options.prevent_overlap,
            |task| {
                tokio::spawn(drive_recurring(
                    task,
                    interval,
                    options.run_immediately,
                    body,
                ))
            },
        );
        Ok(())
    }

    /// Stop the timer for `name`. A running invocation is left to finish.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self
            .registry
            .lock()
            .get_mut(&self.namespace)
            .and_then(|store| store.tasks.remove(name));
        removed.is_some()
    }

    /// Cancel every task in this namespace, returning how many were removed
    pub fn cancel_all(&self) -> usize {
        let drained = self
            .registry
            .lock()
            .get_mut(&self.namespace)
            .map(|store| std::mem::take(&mut store.tasks));
        drained.map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn has(&self, name: &str) -> bool {
        self.registry
            .lock()
            .get(&self.namespace)
            .is_some_and(|store| store.tasks.contains_key(name))
    }

    pub fn task_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .get(&self.namespace)
            .map(|store| store.tasks.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        let table = self.registry.lock();
        match table.get(&self.namespace) {
            Some(store) => namespace_snapshot(&self.namespace, store),
            None => NamespaceSnapshot {
                namespace: self.namespace.clone(),
                created_at_ms: 0,
                task_count: 0,
                tasks: Vec::new(),
            },
        }
    }
}
