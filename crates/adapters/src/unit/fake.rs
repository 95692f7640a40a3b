// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake unit factory for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{channel_pair, ExecutionUnitFactory, LaunchError, UnitHandle};
use super::{UnitExit, UnitKind, UnitSpec};
use async_trait::async_trait;
use fh_core::{ControlMessage, UnitMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

struct FakeInner {
    units_tx: mpsc::UnboundedSender<FakeUnit>,
    units_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeUnit>>,
    failures: Mutex<VecDeque<String>>,
    launched: Mutex<Vec<UnitSpec>>,
}

/// Fake factory. Each successful launch hands the unit side to
/// [`FakeUnitFactory::accept`] so the test can play the unit.
#[derive(Clone)]
pub struct FakeUnitFactory {
    inner: Arc<FakeInner>,
}

impl Default for FakeUnitFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeUnitFactory {
    pub fn new() -> Self {
        let (units_tx, units_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(FakeInner {
                units_tx,
                units_rx: tokio::sync::Mutex::new(units_rx),
                failures: Mutex::new(VecDeque::new()),
                launched: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make the next launch fail
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reason.into());
    }

    /// Wait for the next launched unit
    pub async fn accept(&self) -> FakeUnit {
        let mut rx = self.inner.units_rx.lock().await;
        match rx.recv().await {
            Some(unit) => unit,
            None => unreachable!("factory owns the sender"),
        }
    }

    /// Specs of every attempted launch, failed ones included
    pub fn launched(&self) -> Vec<UnitSpec> {
        self.inner
            .launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched().len()
    }
}

#[async_trait]
impl ExecutionUnitFactory for FakeUnitFactory {
    fn kind(&self) -> UnitKind {
        UnitKind::Thread
    }

    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError> {
        self.inner
            .launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());
        let failure = self
            .inner
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(reason) = failure {
            return Err(LaunchError::Rejected(reason));
        }

        let (handle, endpoint, exit_tx) = channel_pair(UnitKind::Thread, None);
        let _ = self.inner.units_tx.send(FakeUnit {
            spec,
            control: endpoint.control,
            events: endpoint.events,
            exit: Some(exit_tx),
        });
        Ok(handle)
    }
}

/// Unit side of a fake launch
pub struct FakeUnit {
    pub spec: UnitSpec,
    control: mpsc::UnboundedReceiver<ControlMessage>,
    events: mpsc::UnboundedSender<UnitMessage>,
    exit: Option<oneshot::Sender<UnitExit>>,
}

impl FakeUnit {
    pub fn account_id(&self) -> &str {
        self.spec.account_id()
    }

    /// Next control message from the host
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.control.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ControlMessage> {
        self.control.try_recv().ok()
    }

    pub fn send(&self, message: UnitMessage) {
        let _ = self.events.send(message);
    }

    pub fn report_status(&self, status: serde_json::Value) {
        self.send(UnitMessage::Status { status });
    }

    /// Wait for the next call and answer it with `answer`.
    ///
    /// Other control messages arriving first are skipped. Returns the
    /// method name, or `None` once the host hangs up.
    pub async fn answer_call<F>(&mut self, answer: F) -> Option<String>
    where
        F: FnOnce(&str, &[serde_json::Value]) -> Result<serde_json::Value, String>,
    {
        loop {
            if let ControlMessage::Call { id, method, args } = self.recv().await? {
                let reply = match answer(&method, &args) {
                    Ok(data) => UnitMessage::call_ok(id, data),
                    Err(e) => UnitMessage::call_err(id, e),
                };
                self.send(reply);
                return Some(method);
            }
        }
    }

    /// Report an exit and drop the unit side of the channel
    pub fn exit(mut self, exit: UnitExit) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(exit);
        }
    }
}
