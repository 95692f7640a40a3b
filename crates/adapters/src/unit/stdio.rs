// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child side of a process unit.
//!
//! The first line on stdin is the JSON [`UnitSpec`]; every later line is a
//! [`ControlMessage`]. Unit messages go out on stdout, one JSON object per
//! line. Logs must therefore go to stderr.

use super::{LaunchError, UnitEndpoint, UnitSpec};
use fh_core::{decode_line, encode_line, ControlError, ControlMessage, UnitMessage};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A unit attached to a byte stream pair
pub struct StdioUnit {
    pub spec: UnitSpec,
    pub endpoint: UnitEndpoint,
    /// Completes once every unit message has been written and flushed
    pub writer: JoinHandle<()>,
}

/// Attach to the process's own stdin/stdout
pub async fn attach_stdio() -> Result<StdioUnit, LaunchError> {
    attach(tokio::io::stdin(), tokio::io::stdout()).await
}

/// Read the bootstrap line, then pump control lines in and unit messages out
pub async fn attach<R, W>(reader: R, writer: W) -> Result<StdioUnit, LaunchError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    let first = lines
        .next_line()
        .await
        .map_err(|e| LaunchError::Bootstrap(e.to_string()))?
        .ok_or_else(|| LaunchError::Bootstrap("stdin closed before bootstrap".to_string()))?;
    let spec: UnitSpec = decode_line(&first).map_err(|e| LaunchError::Bootstrap(e.to_string()))?;

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<UnitMessage>();

    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match decode_line::<ControlMessage>(&line) {
                    Ok(message) => {
                        if control_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(ControlError::Empty) => {}
                    Err(e) => tracing::warn!(error = %e, "dropping control line"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "control stream read failed");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut out = writer;
        while let Some(message) = events_rx.recv().await {
            let mut line = match encode_line(&message) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode unit message");
                    continue;
                }
            };
            line.push('\n');
            if out.write_all(line.as_bytes()).await.is_err() || out.flush().await.is_err() {
                break;
            }
        }
    });

    Ok(StdioUnit {
        spec,
        endpoint: UnitEndpoint {
            control: control_rx,
            events: events_tx,
        },
        writer,
    })
}
