// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution unit adapters.
//!
//! An execution unit runs one account's session in isolation. The host talks
//! to it only through a [`UnitHandle`]: a control sender, an event receiver,
//! and a one-shot exit report. How the unit is isolated (a dedicated thread
//! with its own runtime, or a child process speaking JSON lines on stdio) is
//! the factory's business.

mod process;
mod stdio;
mod thread;

pub use process::{ProcessConfig, ProcessUnitFactory};
pub use stdio::{attach, attach_stdio, StdioUnit};
pub use thread::ThreadUnitFactory;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeUnit, FakeUnitFactory};

use async_trait::async_trait;
use fh_core::{Account, ConfigSnapshot, ControlMessage, UnitMessage};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from launching a unit
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn unit: {0}")]
    Spawn(String),
    #[error("unit bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("launch rejected: {0}")]
    Rejected(String),
}

/// Isolation strategy, chosen once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    #[default]
    Thread,
    Process,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Thread => write!(f, "thread"),
            UnitKind::Process => write!(f, "process"),
        }
    }
}

/// Everything a unit needs to boot: the full account and its first config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub account: Account,
    pub config: ConfigSnapshot,
}

impl UnitSpec {
    pub fn new(account: Account, config: ConfigSnapshot) -> Self {
        Self { account, config }
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }
}

/// How a unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitExit {
    pub code: Option<i32>,
    pub error: Option<String>,
}

impl UnitExit {
    pub fn clean() -> Self {
        Self {
            code: Some(0),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            code: None,
            error: Some(error.into()),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.code.is_none_or(|c| c == 0)
    }

    /// Human-readable reason, used in crash records and notifications
    pub fn describe(&self) -> String {
        match (&self.error, self.code) {
            (Some(e), _) => e.clone(),
            (None, Some(0)) | (None, None) => "exited".to_string(),
            (None, Some(code)) => format!("exited with code {}", code),
        }
    }
}

/// Unit-side end of the control channel
pub struct UnitEndpoint {
    pub control: mpsc::UnboundedReceiver<ControlMessage>,
    pub events: mpsc::UnboundedSender<UnitMessage>,
}

/// Host-side end of the control channel
pub struct UnitHandle {
    pub kind: UnitKind,
    /// OS process id, for process units
    pub pid: Option<u32>,
    pub control: mpsc::UnboundedSender<ControlMessage>,
    pub events: mpsc::UnboundedReceiver<UnitMessage>,
    pub exit: oneshot::Receiver<UnitExit>,
}

/// In-memory channel pair plus the sender the strategy uses to report exit
pub(crate) fn channel_pair(
    kind: UnitKind,
    pid: Option<u32>,
) -> (UnitHandle, UnitEndpoint, oneshot::Sender<UnitExit>) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();
    let handle = UnitHandle {
        kind,
        pid,
        control: control_tx,
        events: events_rx,
        exit: exit_rx,
    };
    let endpoint = UnitEndpoint {
        control: control_rx,
        events: events_tx,
    };
    (handle, endpoint, exit_tx)
}

/// Entry point executed inside a thread unit
pub type UnitEntry =
    Arc<dyn Fn(UnitSpec, UnitEndpoint) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Strategy for creating isolated execution units
#[async_trait]
pub trait ExecutionUnitFactory: Clone + Send + Sync + 'static {
    fn kind(&self) -> UnitKind;

    /// Launch a unit. Returns as soon as the unit exists; readiness is
    /// reported later through its first status event.
    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError>;
}

/// Factory chosen from the deployment mode at startup
#[derive(Clone)]
pub enum UnitFactory {
    Thread(ThreadUnitFactory),
    Process(ProcessUnitFactory),
}

#[async_trait]
impl ExecutionUnitFactory for UnitFactory {
    fn kind(&self) -> UnitKind {
        match self {
            UnitFactory::Thread(f) => f.kind(),
            UnitFactory::Process(f) => f.kind(),
        }
    }

    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError> {
        match self {
            UnitFactory::Thread(f) => f.launch(spec).await,
            UnitFactory::Process(f) => f.launch(spec).await,
        }
    }
}

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;
