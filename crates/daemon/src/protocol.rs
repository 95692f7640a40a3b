// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local control socket protocol.
//!
//! One request and one response per connection. Each message is a 4-byte
//! big-endian length followed by that many bytes of JSON.

use std::time::Duration;

use fh_adapters::UnitKind;
use fh_core::{BreakerStatus, LogEntry};
use fh_engine::{ExitRecord, LogFilter, SchedulerStatus, StartSummary, UnitInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Version reported in the hello handshake
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read/write timeout for one message
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    StartAccount {
        account_id: String,
    },
    StopAccount {
        account_id: String,
    },
    RestartAccount {
        account_id: String,
    },
    StartAll,
    StopAll,
    RestartAll,
    IsRunning {
        account_id: String,
    },
    SchedulerStatus {
        account_id: String,
    },
    CallUnit {
        account_id: String,
        method: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    BroadcastConfig {
        #[serde(default)]
        account_id: Option<String>,
    },
    Logs {
        #[serde(default)]
        filter: LogFilter,
    },
    AccountLogs {
        #[serde(default)]
        filter: LogFilter,
    },
    BreakerStatus,
    BreakerReset,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Hello {
        version: String,
    },
    Ok,
    ShuttingDown,
    Error {
        message: String,
    },
    Status {
        uptime_secs: u64,
        mode: UnitKind,
        accounts: usize,
        units: Vec<UnitInfo>,
        crashed: Vec<ExitRecord>,
    },
    /// Result of a single-account start or stop; `changed` is false when
    /// the account was already in the requested state
    Account {
        account_id: String,
        changed: bool,
    },
    Started {
        summary: StartSummary,
    },
    Stopped {
        count: usize,
    },
    Running {
        account_id: String,
        running: bool,
    },
    Schedulers {
        status: SchedulerStatus,
    },
    UnitResult {
        data: serde_json::Value,
    },
    Broadcast {
        delivered: usize,
    },
    Logs {
        entries: Vec<LogEntry>,
    },
    Breaker {
        status: BreakerStatus,
    },
}

impl Request {
    /// Whether the daemon answers only after a call into a unit, which has
    /// its own, longer timeout
    pub fn waits_on_unit(&self) -> bool {
        matches!(
            self,
            Request::CallUnit { .. } | Request::SchedulerStatus { .. }
        )
    }
}

impl Response {
    pub fn error(message: impl std::fmt::Display) -> Self {
        Response::Error {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("message too large: {0} bytes")]
    TooLarge(usize),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize to JSON, without the length prefix
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let len = u32::try_from(data.len()).map_err(|_| ProtocolError::TooLarge(data.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let data = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&data)
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
