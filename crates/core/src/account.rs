// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account, credential, and configuration snapshot model

use serde::{Deserialize, Serialize};

/// Login material for one game session.
///
/// The core never interprets these beyond handing them to the connector and
/// the login handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// One-time or long-lived login code issued by the platform
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "qq".to_string()
}

/// A known account, as listed by the account registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Inline configuration used when no remote config source answers
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl Account {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            credentials: Credentials {
                code: code.into(),
                open_id: None,
                platform: default_platform(),
            },
            config: serde_json::Value::Null,
        }
    }

    /// Name for logs, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Versioned, opaque configuration pushed to one execution unit.
///
/// Only the unit's own logic interprets `data`; the runtime just routes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub account_id: String,
    pub revision: u64,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ConfigSnapshot {
    pub fn new(account_id: impl Into<String>, revision: u64, data: serde_json::Value) -> Self {
        Self {
            account_id: account_id.into(),
            revision,
            data,
        }
    }

    /// Snapshot with no configuration at all
    pub fn empty(account_id: impl Into<String>) -> Self {
        Self::new(account_id, 0, serde_json::Value::Null)
    }
}
