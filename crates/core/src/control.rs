// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel envelope between the runtime engine and execution units.
//!
//! Both directions are tagged by a `type` field so the same envelope can
//! travel over an in-process channel or as JSON lines on a child's stdio.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::ConfigSnapshot;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("empty control line")]
    Empty,
    #[error("malformed control message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine to unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    ConfigSync {
        config: ConfigSnapshot,
    },
    Call {
        id: String,
        method: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    /// Graceful stop: the unit tears down and exits on its own
    Stop,
}

/// Unit to engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitMessage {
    CallResult {
        id: String,
        ok: bool,
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Status {
        status: serde_json::Value,
    },
    Log {
        entry: LogEntry,
    },
    AccountLog {
        entry: LogEntry,
    },
}

impl UnitMessage {
    pub fn call_ok(id: impl Into<String>, data: serde_json::Value) -> Self {
        UnitMessage::CallResult {
            id: id.into(),
            ok: true,
            data,
            error: None,
        }
    }

    pub fn call_err(id: impl Into<String>, error: impl Into<String>) -> Self {
        UnitMessage::CallResult {
            id: id.into(),
            ok: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One log line produced by a unit or the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts_ms: u64,
    pub level: LogLevel,
    /// Short category, e.g. "system" or "heartbeat"
    pub tag: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl LogEntry {
    pub fn new(level: LogLevel, tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ts_ms: crate::clock::epoch_ms(),
            level,
            tag: tag.into(),
            message: message.into(),
            account_id: None,
            account_name: None,
            meta: serde_json::Value::Null,
        }
    }

    pub fn for_account(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.account_id = Some(id.into());
        self.account_name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Encode a message as a single JSON line (no trailing newline)
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ControlError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one JSON line, ignoring surrounding whitespace
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ControlError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ControlError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
