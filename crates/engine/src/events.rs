// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed runtime event bus.
//!
//! Every upward message from a unit becomes a [`RuntimeEvent`]. Registered
//! sinks see events synchronously in publish order; subscribers get them
//! through a broadcast channel and may lag.

use crate::collab::RuntimeSink;
use crate::orchestrator::UnitState;
use fh_adapters::UnitKind;
use fh_core::LogEntry;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Status {
        account_id: String,
        account_name: String,
        status: serde_json::Value,
    },
    Log {
        entry: LogEntry,
    },
    AccountLog {
        entry: LogEntry,
    },
    UnitStarted {
        account_id: String,
        kind: UnitKind,
    },
    UnitExited {
        account_id: String,
        state: UnitState,
        reason: String,
    },
}

impl RuntimeEvent {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            RuntimeEvent::Status { account_id, .. }
            | RuntimeEvent::UnitStarted { account_id, .. }
            | RuntimeEvent::UnitExited { account_id, .. } => Some(account_id),
            RuntimeEvent::Log { entry } | RuntimeEvent::AccountLog { entry } => {
                entry.account_id.as_deref()
            }
        }
    }
}

/// Canonical event bus, cheap to clone
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RuntimeEvent>,
    sinks: Arc<Mutex<Vec<Arc<dyn RuntimeSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn RuntimeSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RuntimeEvent) {
        let sinks: Vec<Arc<dyn RuntimeSink>> = self
            .sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for sink in &sinks {
            match &event {
                RuntimeEvent::Status {
                    account_id,
                    account_name,
                    status,
                } => sink.on_status(account_id, account_name, status),
                RuntimeEvent::Log { entry } => sink.on_log(entry),
                RuntimeEvent::AccountLog { entry } => sink.on_account_log(entry),
                RuntimeEvent::UnitStarted { .. } | RuntimeEvent::UnitExited { .. } => {}
            }
        }
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
