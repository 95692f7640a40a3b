// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login and heartbeat messages
//!
//! The concrete game message catalog lives outside this crate; a
//! [`Handshake`] only has to say which procedure to call and with what body.

use bytes::Bytes;
use fh_core::Credentials;

/// A request body addressed to one remote procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub service: String,
    pub method: String,
    pub body: Bytes,
}

impl Outbound {
    pub fn new(service: impl Into<String>, method: impl Into<String>, body: Bytes) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            body,
        }
    }

    pub fn method_key(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

pub trait Handshake: Send + Sync + 'static {
    /// Request that logs the connection in. A non-zero error code on its
    /// reply is treated as an authentication rejection.
    fn login(&self, credentials: &Credentials) -> Outbound;

    fn heartbeat(&self) -> Outbound;

    /// Server clock (epoch milliseconds) carried by a login reply body
    fn login_server_time(&self, _reply: &[u8]) -> Option<u64> {
        None
    }

    /// Server clock (epoch milliseconds) carried by a heartbeat reply body
    fn heartbeat_server_time(&self, _reply: &[u8]) -> Option<u64> {
        None
    }
}

fn json_millis(body: &[u8], field: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match &value[field] {
        serde_json::Value::Number(n) => n.as_u64(),
        // 64-bit values may arrive as strings
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Handshake with JSON bodies against the user service
#[derive(Debug, Clone)]
pub struct JsonHandshake {
    pub service: String,
    pub client_version: String,
}

impl Default for JsonHandshake {
    fn default() -> Self {
        Self {
            service: "gamepb.userpb.UserService".to_string(),
            client_version: String::new(),
        }
    }
}

impl JsonHandshake {
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
            ..Self::default()
        }
    }
}

impl Handshake for JsonHandshake {
    fn login(&self, credentials: &Credentials) -> Outbound {
        let body = serde_json::json!({
            "code": credentials.code,
            "open_id": credentials.open_id,
            "platform": credentials.platform,
            "client_version": self.client_version,
        });
        Outbound::new(&*self.service, "Login", Bytes::from(body.to_string()))
    }

    fn heartbeat(&self) -> Outbound {
        let body = serde_json::json!({ "client_version": self.client_version });
        Outbound::new(&*self.service, "Heartbeat", Bytes::from(body.to_string()))
    }

    fn login_server_time(&self, reply: &[u8]) -> Option<u64> {
        json_millis(reply, "time_now_millis")
    }

    fn heartbeat_server_time(&self, reply: &[u8]) -> Option<u64> {
        json_millis(reply, "server_time")
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
