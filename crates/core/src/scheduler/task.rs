// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entries and the drivers that fire them

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::snapshot::TaskSnapshot;
use super::TaskKind;
use crate::clock::epoch_ms;

pub(super) type Table = Mutex<BTreeMap<String, NamespaceStore>>;

pub(super) struct NamespaceStore {
    pub created_at_ms: u64,
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl NamespaceStore {
    pub fn new() -> Self {
        Self {
            created_at_ms: epoch_ms(),
            tasks: BTreeMap::new(),
        }
    }
}

pub(super) struct TaskEntry {
    pub kind: TaskKind,
    pub period: Duration,
    pub created_at_ms: u64,
    pub next_run_at_ms: Option<u64>,
    pub last_run_at_ms: Option<u64>,
    pub run_count: u64,
    pub in_flight: usize,
    pub prevent_overlap: bool,
    pub generation: u64,
    pub driver: Option<JoinHandle<()>>,
}

impl TaskEntry {
    pub fn new(kind: TaskKind, period: Duration, prevent_overlap: bool, generation: u64) -> Self {
        let now = epoch_ms();
        Self {
            kind,
            period,
            created_at_ms: now,
            next_run_at_ms: Some(now + duration_ms(period)),
            last_run_at_ms: None,
            run_count: 0,
            in_flight: 0,
            prevent_overlap,
            generation,
            driver: None,
        }
    }

    pub fn snapshot(&self, name: &str) -> TaskSnapshot {
        TaskSnapshot {
            name: name.to_string(),
            kind: self.kind,
            interval_ms: duration_ms(self.period),
            created_at_ms: self.created_at_ms,
            next_run_at_ms: self.next_run_at_ms,
            last_run_at_ms: self.last_run_at_ms,
            run_count: self.run_count,
            running: self.in_flight > 0,
            prevent_overlap: self.prevent_overlap,
        }
    }
}

impl Drop for TaskEntry {
    // Removing an entry from the table stops its timer. Bodies already
    // running live on their own tasks and are left to finish.
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

pub(super) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of a due tick
enum Begin {
    Start,
    Skip,
    Gone,
}

/// Identity of one registration: (namespace, name, generation).
///
/// A replaced or cancelled task keeps a stale generation, so its driver and
/// any in-flight finalizer stop touching the table.
#[derive(Clone)]
pub(super) struct TaskRef {
    pub table: Weak<Table>,
    pub namespace: String,
    pub name: String,
    pub generation: u64,
}

impl TaskRef {
    fn with_entry<R>(&self, f: impl FnOnce(&mut BTreeMap<String, TaskEntry>) -> R) -> Option<R> {
        let table = self.table.upgrade()?;
        let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
        let store = table.get_mut(&self.namespace)?;
        match store.tasks.get(&self.name) {
            Some(entry) if entry.generation == self.generation => Some(f(&mut store.tasks)),
            _ => None,
        }
    }

    fn begin(&self) -> Begin {
        let outcome = self.with_entry(|tasks| {
            let Some(entry) = tasks.get_mut(&self.name) else {
                return Begin::Gone;
            };
            let now = epoch_ms();
            match entry.kind {
                TaskKind::OneShot => entry.next_run_at_ms = None,
                TaskKind::Recurring => {
                    entry.next_run_at_ms = Some(now + duration_ms(entry.period));
                }
            }
            if entry.prevent_overlap && entry.in_flight > 0 {
                return Begin::Skip;
            }
            entry.in_flight += 1;
            entry.run_count += 1;
            entry.last_run_at_ms = Some(now);
            Begin::Start
        });
        outcome.unwrap_or(Begin::Gone)
    }

    fn finish(&self) {
        self.with_entry(|tasks| {
            let one_shot = match tasks.get_mut(&self.name) {
                Some(entry) => {
                    entry.in_flight = entry.in_flight.saturating_sub(1);
                    entry.kind == TaskKind::OneShot
                }
                None => false,
            };
            if one_shot {
                tasks.remove(&self.name);
            }
        });
    }
}

/// Run one invocation on its own task, then settle the entry.
fn launch<Fut, E>(task: TaskRef, fut: Fut)
where
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::spawn(fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                namespace = %task.namespace,
                task = %task.name,
                error = %e,
                "scheduled task failed"
            ),
            Err(e) if e.is_panic() => tracing::error!(
                namespace = %task.namespace,
                task = %task.name,
                "scheduled task panicked"
            ),
            Err(_) => {}
        }
        task.finish();
    });
}

pub(super) async fn drive_once<F, Fut, E>(task: TaskRef, delay: Duration, body: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::time::sleep(delay).await;
    if let Begin::Start = task.begin() {
        launch(task, body());
    }
}

pub(super) async fn drive_recurring<F, Fut, E>(
    task: TaskRef,
    period: Duration,
    run_immediately: bool,
    mut body: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if run_immediately && !fire(&task, &mut body) {
        return;
    }
    loop {
        ticker.tick().await;
        if !fire(&task, &mut body) {
            return;
        }
    }
}

/// Returns false once the registration is gone
fn fire<F, Fut, E>(task: &TaskRef, body: &mut F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    match task.begin() {
        Begin::Start => {
            launch(task.clone(), body());
            true
        }
        Begin::Skip => {
            tracing::debug!(
                namespace = %task.namespace,
                task = %task.name,
                "previous run still in flight, skipping tick"
            );
            true
        }
        Begin::Gone => false,
    }
}
