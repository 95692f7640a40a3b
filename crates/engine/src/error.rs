// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime

use fh_adapters::LaunchError;
use thiserror::Error;

/// Errors from orchestrator and runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("failed to launch unit for {account_id}: {source}")]
    Launch {
        account_id: String,
        #[source]
        source: LaunchError,
    },
}

/// Errors from calling into a running unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitCallError {
    #[error("account {account_id} is not running")]
    NotRunning { account_id: String },
    #[error("unit call {method} on {account_id} timed out")]
    Timeout { account_id: String, method: String },
    #[error("unit for {account_id} stopped before answering {method}")]
    Stopped { account_id: String, method: String },
    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },
}

/// Reasons a unit ends on its own
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("session halted: {0}")]
    Halted(String),
    #[error("kicked out by server")]
    Kicked,
}
