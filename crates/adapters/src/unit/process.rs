// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process execution units: a child process speaking JSON lines on stdio

use super::{channel_pair, ExecutionUnitFactory, LaunchError, UnitHandle};
use super::{UnitExit, UnitKind, UnitSpec};
use async_trait::async_trait;
use fh_core::{decode_line, encode_line, ControlError, ControlMessage, UnitMessage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Notify};

/// How to start a unit process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// How long a unit may take to exit after a stop before it is killed
    #[serde(with = "humantime_serde", default = "default_stop_grace")]
    pub stop_grace: Duration,
}

fn default_stop_grace() -> Duration {
    Duration::from_secs(5)
}

impl ProcessConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stop_grace: default_stop_grace(),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Launches each unit as a child process
#[derive(Clone)]
pub struct ProcessUnitFactory {
    config: Arc<ProcessConfig>,
}

impl ProcessUnitFactory {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }
}

#[async_trait]
impl ExecutionUnitFactory for ProcessUnitFactory {
    fn kind(&self) -> UnitKind {
        UnitKind::Process
    }

    async fn launch(&self, spec: UnitSpec) -> Result<UnitHandle, LaunchError> {
        let bootstrap = encode_line(&spec).map_err(|e| LaunchError::Bootstrap(e.to_string()))?;

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LaunchError::Spawn(format!("{}: {}", self.config.program.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LaunchError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Spawn("child stdout unavailable".to_string()))?;

        let pid = child.id();
        let (handle, endpoint, exit_tx) = channel_pair(UnitKind::Process, pid);
        let stopping = Arc::new(Notify::new());

        tracing::debug!(account_id = spec.account_id(), pid, "unit process spawned");

        tokio::spawn(write_control(
            stdin,
            bootstrap,
            endpoint.control,
            Arc::clone(&stopping),
        ));
        tokio::spawn(read_events(stdout, endpoint.events));
        tokio::spawn(wait_exit(
            child,
            self.config.stop_grace,
            stopping,
            exit_tx,
        ));

        Ok(handle)
    }
}

async fn write_control(
    mut stdin: ChildStdin,
    bootstrap: String,
    mut control: mpsc::UnboundedReceiver<ControlMessage>,
    stopping: Arc<Notify>,
) {
    if write_line(&mut stdin, bootstrap).await.is_err() {
        return;
    }
    while let Some(message) = control.recv().await {
        let is_stop = matches!(message, ControlMessage::Stop);
        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode control message");
                continue;
            }
        };
        if write_line(&mut stdin, line).await.is_err() {
            break;
        }
        if is_stop {
            stopping.notify_one();
        }
    }
    // Dropping stdin closes the child's control stream
}

async fn write_line(stdin: &mut ChildStdin, mut line: String) -> std::io::Result<()> {
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

async fn read_events(stdout: ChildStdout, events: mpsc::UnboundedSender<UnitMessage>) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match decode_line::<UnitMessage>(&line) {
            Ok(message) => {
                if events.send(message).is_err() {
                    break;
                }
            }
            Err(ControlError::Empty) => {}
            Err(e) => tracing::warn!(error = %e, "dropping unit output line"),
        }
    }
}

async fn wait_exit(
    mut child: Child,
    grace: Duration,
    stopping: Arc<Notify>,
    exit_tx: oneshot::Sender<UnitExit>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = stopping.notified() => {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(pid = child.id(), "unit ignored stop, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "kill failed");
                    }
                    let _ = exit_tx.send(UnitExit::failed("killed after stop grace period"));
                    return;
                }
            }
        }
    };

    let exit = match status {
        Ok(status) if status.success() => UnitExit::clean(),
        Ok(status) => UnitExit {
            code: status.code(),
            error: status
                .code()
                .is_none()
                .then(|| format!("terminated: {}", status)),
        },
        Err(e) => UnitExit::failed(format!("wait failed: {}", e)),
    };
    let _ = exit_tx.send(exit);
}
