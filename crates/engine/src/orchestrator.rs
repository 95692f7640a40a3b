// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker orchestrator: owns one execution unit per running account.
//!
//! A unit is live from the moment its launch succeeds until it is stopped or
//! exits on its own. Stopping removes it from the live map right away; the
//! handle is left to wind down and its exit is recorded as `Stopped`. Any
//! other exit is a crash: the unit is marked `Crashed`, removed, and an
//! offline notice may be sent. Crashed units are never restarted here.

use crate::collab::ConfigProvider;
use crate::error::{RuntimeError, UnitCallError};
use crate::events::{EventBus, RuntimeEvent};
use fh_adapters::{ExecutionUnitFactory, Notice, NotifyAdapter, UnitExit, UnitKind, UnitSpec};
use fh_core::{epoch_ms, Account, ControlMessage, LogEntry, LogLevel, UnitMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Timeout for a call into a unit
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Send an offline notice when a unit crashes
    pub notify_on_crash: bool,
    /// How long shutdown waits for stopped units to exit
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            notify_on_crash: true,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Launched, no status reported yet
    Starting,
    Running,
    /// Stop sent, waiting for the handle to exit
    Stopping,
    Stopped,
    Crashed,
}

/// Read-only view of a live unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub account_id: String,
    pub account_name: String,
    pub kind: UnitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub state: UnitState,
    pub started_at_ms: u64,
    pub last_status: Option<serde_json::Value>,
    pub pending_calls: usize,
}

/// Why the most recent unit for an account went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub account_id: String,
    pub state: UnitState,
    pub reason: String,
    pub at_ms: u64,
    #[serde(skip)]
    generation: u64,
}

type CallSink = oneshot::Sender<Result<serde_json::Value, UnitCallError>>;

struct LiveUnit {
    generation: u64,
    account: Account,
    kind: UnitKind,
    pid: Option<u32>,
    state: UnitState,
    control: mpsc::UnboundedSender<ControlMessage>,
    started_at_ms: u64,
    last_status: Option<serde_json::Value>,
    pending: HashMap<String, (String, CallSink)>,
}

impl LiveUnit {
    fn info(&self) -> UnitInfo {
        UnitInfo {
            account_id: self.account.id.clone(),
            account_name: self.account.display_name().to_string(),
            kind: self.kind,
            pid: self.pid,
            state: self.state,
            started_at_ms: self.started_at_ms,
            last_status: self.last_status.clone(),
            pending_calls: self.pending.len(),
        }
    }

    /// Reject every outstanding call
    fn fail_pending(&mut self) {
        for (_, (method, sink)) in self.pending.drain() {
            let _ = sink.send(Err(UnitCallError::Stopped {
                account_id: self.account.id.clone(),
                method,
            }));
        }
    }
}

#[derive(Default)]
struct State {
    next_generation: u64,
    live: HashMap<String, LiveUnit>,
    /// Accounts whose launch is in flight, with the generation it will get
    launching: HashMap<String, u64>,
    exits: HashMap<String, ExitRecord>,
}

struct Inner<F, N> {
    factory: F,
    notify: N,
    config: OrchestratorConfig,
    configs: Arc<dyn ConfigProvider>,
    bus: EventBus,
    state: Mutex<State>,
    /// Launches in flight plus units whose exit is not yet recorded
    alive: watch::Sender<usize>,
}

/// Owns the set of live execution units
pub struct Orchestrator<F, N> {
    inner: Arc<Inner<F, N>>,
}

impl<F, N> Clone for Orchestrator<F, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ExecutionUnitFactory, N: NotifyAdapter> Orchestrator<F, N> {
    pub fn new(
        factory: F,
        notify: N,
        configs: Arc<dyn ConfigProvider>,
        bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                notify,
                config,
                configs,
                bus,
                state: Mutex::new(State::default()),
                alive: watch::channel(0).0,
            }),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.inner.factory.kind()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Launch a unit for `account` unless one is already live or launching.
    ///
    /// Returns `Ok(false)` when nothing was started. Readiness is signalled
    /// later by the unit's first status event.
    pub async fn start(&self, account: Account) -> Result<bool, RuntimeError> {
        let generation = {
            let mut state = self.inner.lock();
            if state.live.contains_key(&account.id) || state.launching.contains_key(&account.id) {
                tracing::debug!(account_id = %account.id, "unit already running");
                return Ok(false);
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            state.launching.insert(account.id.clone(), generation);
            generation
        };
        self.inner.alive.send_modify(|n| *n += 1);

        let config = self.inner.configs.snapshot(&account).await;
        let spec = UnitSpec::new(account.clone(), config);
        let launched = self.inner.factory.launch(spec).await;

        let mut state = self.inner.lock();
        // A stop or restart while launching took this launch's token away
        let still_wanted = state.launching.get(&account.id) == Some(&generation);
        if still_wanted {
            state.launching.remove(&account.id);
        }
        let handle = match launched {
            Ok(handle) => handle,
            Err(source) => {
                drop(state);
                self.inner.alive.send_modify(|n| *n = n.saturating_sub(1));
                tracing::error!(account_id = %account.id, error = %source, "unit launch failed");
                self.inner.account_log(
                    &account,
                    LogLevel::Error,
                    format!("failed to start: {}", source),
                );
                return Err(RuntimeError::Launch {
                    account_id: account.id,
                    source,
                });
            }
        };

        let kind = handle.kind;

        if !still_wanted {
            // Stopped while launching
            let _ = handle.control.send(ControlMessage::Stop);
            let superseded =
                state.live.contains_key(&account.id) || state.launching.contains_key(&account.id);
            if !superseded {
                state.exits.insert(
                    account.id.clone(),
                    ExitRecord {
                        account_id: account.id.clone(),
                        state: UnitState::Stopping,
                        reason: "stopped during launch".to_string(),
                        at_ms: epoch_ms(),
                        generation,
                    },
                );
            }
            drop(state);
            tokio::spawn(supervise(
                Arc::clone(&self.inner),
                account,
                generation,
                handle.events,
                handle.exit,
            ));
            return Ok(false);
        }

        state.live.insert(
            account.id.clone(),
            LiveUnit {
                generation,
                account: account.clone(),
                kind,
                pid: handle.pid,
                state: UnitState::Starting,
                control: handle.control,
                started_at_ms: epoch_ms(),
                last_status: None,
                pending: HashMap::new(),
            },
        );
        drop(state);

        tracing::info!(account_id = %account.id, %kind, pid = handle.pid, "unit started");
        self.inner.bus.publish(RuntimeEvent::UnitStarted {
            account_id: account.id.clone(),
            kind,
        });
        self.inner
            .account_log(&account, LogLevel::Info, format!("started ({} unit)", kind));

        tokio::spawn(supervise(
            Arc::clone(&self.inner),
            account,
            generation,
            handle.events,
            handle.exit,
        ));
        Ok(true)
    }

    /// Ask the unit to stop and forget it. Does not wait for the exit.
    pub fn stop(&self, account_id: &str) -> bool {
        let mut state = self.inner.lock();
        if state.launching.remove(account_id).is_some() {
            tracing::info!(account_id, "stop requested during launch");
            return true;
        }
        let Some(mut unit) = state.live.remove(account_id) else {
            return false;
        };
        unit.state = UnitState::Stopping;
        let _ = unit.control.send(ControlMessage::Stop);
        unit.fail_pending();
        state.exits.insert(
            account_id.to_string(),
            ExitRecord {
                account_id: account_id.to_string(),
                state: UnitState::Stopping,
                reason: "stop requested".to_string(),
                at_ms: epoch_ms(),
                generation: unit.generation,
            },
        );
        drop(state);

        tracing::info!(account_id, "unit stopping");
        self.inner
            .account_log(&unit.account, LogLevel::Info, "stopping".to_string());
        true
    }

    /// Stop then start with the same account
    pub async fn restart(&self, account: Account) -> Result<bool, RuntimeError> {
        self.stop(&account.id);
        self.start(account).await
    }

    /// Stop every live unit; returns how many were asked to stop
    pub fn stop_all(&self) -> usize {
        let ids: Vec<String> = {
            let state = self.inner.lock();
            state
                .live
                .keys()
                .chain(state.launching.keys())
                .cloned()
                .collect()
        };
        ids.iter().filter(|id| self.stop(id)).count()
    }

    /// Stop every unit and wait up to `grace` for all of them to exit.
    ///
    /// Launches still in flight count as units; they are stopped as soon as
    /// they complete. Returns how many were asked to stop.
    pub async fn stop_all_and_wait(&self, grace: Duration) -> usize {
        let stopped = self.stop_all();
        let mut alive = self.inner.alive.subscribe();
        let timed_out = tokio::time::timeout(grace, alive.wait_for(|n| *n == 0))
            .await
            .is_err();
        if timed_out {
            let remaining = *alive.borrow();
            tracing::warn!(remaining, ?grace, "units still running after shutdown grace");
        }
        stopped
    }

    /// Push a fresh config snapshot to every live unit, or just `target`.
    ///
    /// Delivery failures are ignored; a unit that already exited is cleaned
    /// up by its own exit handling. Returns the number of units reached.
    pub async fn broadcast_config(&self, target: Option<&str>) -> usize {
        let targets: Vec<(Account, mpsc::UnboundedSender<ControlMessage>)> = {
            let state = self.inner.lock();
            state
                .live
                .values()
                .filter(|u| target.is_none_or(|t| u.account.id == t))
                .map(|u| (u.account.clone(), u.control.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (account, control) in targets {
            let config = self.inner.configs.snapshot(&account).await;
            let revision = config.revision;
            if control.send(ControlMessage::ConfigSync { config }).is_ok() {
                delivered += 1;
                tracing::debug!(account_id = %account.id, revision, "config pushed");
            }
        }
        delivered
    }

    /// Request/response call into a unit's API
    pub async fn call_unit_api(
        &self,
        account_id: &str,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, UnitCallError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut state = self.inner.lock();
            let unit = state
                .live
                .get_mut(account_id)
                .ok_or_else(|| UnitCallError::NotRunning {
                    account_id: account_id.to_string(),
                })?;
            unit.pending
                .insert(id.clone(), (method.to_string(), tx));
            let message = ControlMessage::Call {
                id: id.clone(),
                method: method.to_string(),
                args,
            };
            if unit.control.send(message).is_err() {
                unit.pending.remove(&id);
                return Err(UnitCallError::NotRunning {
                    account_id: account_id.to_string(),
                });
            }
            unit.generation
        };

        match tokio::time::timeout(self.inner.config.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UnitCallError::Stopped {
                account_id: account_id.to_string(),
                method: method.to_string(),
            }),
            Err(_) => {
                let mut state = self.inner.lock();
                if let Some(unit) = state.live.get_mut(account_id) {
                    if unit.generation == generation {
                        unit.pending.remove(&id);
                    }
                }
                tracing::warn!(account_id, method, "unit call timed out");
                Err(UnitCallError::Timeout {
                    account_id: account_id.to_string(),
                    method: method.to_string(),
                })
            }
        }
    }

    pub fn is_running(&self, account_id: &str) -> bool {
        let state = self.inner.lock();
        state.live.contains_key(account_id) || state.launching.contains_key(account_id)
    }

    pub fn unit(&self, account_id: &str) -> Option<UnitInfo> {
        self.inner.lock().live.get(account_id).map(LiveUnit::info)
    }

    /// Live units sorted by account id
    pub fn units(&self) -> Vec<UnitInfo> {
        let mut units: Vec<UnitInfo> = self.inner.lock().live.values().map(LiveUnit::info).collect();
        units.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        units
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn last_exit(&self, account_id: &str) -> Option<ExitRecord> {
        self.inner.lock().exits.get(account_id).cloned()
    }

    /// Accounts whose most recent unit crashed
    pub fn crashed_count(&self) -> usize {
        self.inner
            .lock()
            .exits
            .values()
            .filter(|r| r.state == UnitState::Crashed)
            .count()
    }
}

impl<F, N: NotifyAdapter> Inner<F, N> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn account_log(&self, account: &Account, level: LogLevel, message: String) {
        let entry = LogEntry::new(level, "runtime", message)
            .for_account(&account.id, account.display_name());
        self.bus.publish(RuntimeEvent::AccountLog { entry });
    }

    fn on_message(&self, account: &Account, generation: u64, message: UnitMessage) {
        match message {
            UnitMessage::Status { status } => {
                {
                    let mut state = self.lock();
                    if let Some(unit) = state.live.get_mut(&account.id) {
                        if unit.generation == generation {
                            if unit.state == UnitState::Starting {
                                unit.state = UnitState::Running;
                            }
                            unit.last_status = Some(status.clone());
                        }
                    }
                }
                self.bus.publish(RuntimeEvent::Status {
                    account_id: account.id.clone(),
                    account_name: account.display_name().to_string(),
                    status,
                });
            }
            UnitMessage::Log { entry } => {
                let entry = stamp(entry, account);
                self.bus.publish(RuntimeEvent::Log { entry });
            }
            UnitMessage::AccountLog { entry } => {
                let entry = stamp(entry, account);
                self.bus.publish(RuntimeEvent::AccountLog { entry });
            }
            UnitMessage::CallResult {
                id,
                ok,
                data,
                error,
            } => {
                let sink = {
                    let mut state = self.lock();
                    state
                        .live
                        .get_mut(&account.id)
                        .filter(|u| u.generation == generation)
                        .and_then(|u| u.pending.remove(&id))
                };
                let Some((method, sink)) = sink else {
                    tracing::debug!(account_id = %account.id, %id, "unmatched unit call result");
                    return;
                };
                let result = if ok {
                    Ok(data)
                } else {
                    Err(UnitCallError::Remote {
                        method,
                        message: error.unwrap_or_else(|| "unit call failed".to_string()),
                    })
                };
                let _ = sink.send(result);
            }
        }
    }

    fn on_exit(&self, account: &Account, generation: u64, exit: UnitExit) {
        let reason = exit.describe();
        let mut state = self.lock();
        let crashed = state
            .live
            .get(&account.id)
            .is_some_and(|u| u.generation == generation);

        if crashed {
            if let Some(mut unit) = state.live.remove(&account.id) {
                unit.state = UnitState::Crashed;
                unit.fail_pending();
            }
            state.exits.insert(
                account.id.clone(),
                ExitRecord {
                    account_id: account.id.clone(),
                    state: UnitState::Crashed,
                    reason: reason.clone(),
                    at_ms: epoch_ms(),
                    generation,
                },
            );
            drop(state);

            tracing::error!(account_id = %account.id, %reason, "unit crashed");
            self.account_log(account, LogLevel::Error, format!("unit exited unexpectedly: {}", reason));
            self.bus.publish(RuntimeEvent::UnitExited {
                account_id: account.id.clone(),
                state: UnitState::Crashed,
                reason: reason.clone(),
            });
            if self.config.notify_on_crash {
                let notify = self.notify.clone();
                let notice = Notice::offline(&account.id, account.display_name(), &reason);
                tokio::spawn(async move {
                    if let Err(e) = notify.send(&notice).await {
                        tracing::warn!(account_id = %notice.account_id, error = %e, "offline notice failed");
                    }
                });
            }
            return;
        }

        if let Some(record) = state.exits.get_mut(&account.id) {
            if record.generation == generation {
                record.state = UnitState::Stopped;
                record.at_ms = epoch_ms();
                if !exit.is_clean() {
                    record.reason = format!("stopped ({})", reason);
                }
            }
        }
        drop(state);

        tracing::info!(account_id = %account.id, %reason, "unit stopped");
        self.bus.publish(RuntimeEvent::UnitExited {
            account_id: account.id.clone(),
            state: UnitState::Stopped,
            reason,
        });
    }
}

/// Fill in account identity the unit left out
fn stamp(mut entry: LogEntry, account: &Account) -> LogEntry {
    if entry.account_id.is_none() {
        entry.account_id = Some(account.id.clone());
    }
    if entry.account_name.is_none() {
        entry.account_name = Some(account.display_name().to_string());
    }
    entry
}

async fn supervise<F: ExecutionUnitFactory, N: NotifyAdapter>(
    inner: Arc<Inner<F, N>>,
    account: Account,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<UnitMessage>,
    mut exit: oneshot::Receiver<UnitExit>,
) {
    let mut events_open = true;
    let exit = loop {
        tokio::select! {
            biased;
            message = events.recv(), if events_open => match message {
                Some(message) => inner.on_message(&account, generation, message),
                None => events_open = false,
            },
            result = &mut exit => {
                break result.unwrap_or_else(|_| UnitExit::failed("unit vanished without exit report"));
            }
        }
    };
    while let Ok(message) = events.try_recv() {
        inner.on_message(&account, generation, message);
    }
    inner.on_exit(&account, generation, exit);
    inner.alive.send_modify(|n| *n = n.saturating_sub(1));
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
