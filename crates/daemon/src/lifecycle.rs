// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: state directory, lock, socket, shutdown.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fh_adapters::{ExecutionUnitFactory, NotifyAdapter};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::protocol::PROTOCOL_VERSION;
use crate::server::ServerContext;
use crate::settings::Settings;
use crate::wiring::Assembly;

/// Directory name under the platform state directory
const STATE_DIR_NAME: &str = "fieldhand";

/// Daemon file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            state_dir,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, LifecycleError> {
        match &settings.state_dir {
            Some(dir) => Ok(Self::in_dir(dir)),
            None => Ok(Self::in_dir(default_state_dir()?)),
        }
    }
}

/// `$XDG_STATE_HOME/fieldhand`, else the platform state directory, else
/// `~/.local/state/fieldhand`
fn default_state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(STATE_DIR_NAME));
    }
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join(STATE_DIR_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".local/state").join(STATE_DIR_NAME))
        .ok_or(LifecycleError::NoStateDir)
}

/// Daemon state during operation
pub struct DaemonState<F, N> {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub ctx: ServerContext<F, N>,
}

impl<F: ExecutionUnitFactory, N: NotifyAdapter> DaemonState<F, N> {
    /// Stop every unit and host job, wait for the units to exit, then
    /// remove the daemon's files
    pub async fn shutdown(&self) {
        info!("shutting down daemon");

        let stopped = self.ctx.engine.shutdown().await;
        info!(stopped, "units stopped");

        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &self.config.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove daemon file");
                }
            }
        }

        // Lock file is released when self.lock_file is dropped
        info!("daemon shutdown complete");
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Take the daemon lock, write the pid and version files, and bind the
/// control socket around an assembled engine.
pub async fn startup<F, N>(
    config: &Config,
    assembly: Assembly<F, N>,
) -> Result<DaemonState<F, N>, LifecycleError>
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    std::fs::create_dir_all(&config.state_dir)?;

    // Lock FIRST; a losing daemon must not touch the winner's files
    let lock_file = acquire_lock(&config.lock_path)?;

    match startup_inner(config, lock_file, assembly) {
        Ok(state) => Ok(state),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    Ok(file)
}

fn startup_inner<F, N>(
    config: &Config,
    mut lock_file: File,
    assembly: Assembly<F, N>,
) -> Result<DaemonState<F, N>, LifecycleError>
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(&config.version_path, PROTOCOL_VERSION)?;

    // Stale socket from a daemon that did not shut down cleanly
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(
        state_dir = %config.state_dir.display(),
        mode = %assembly.engine.kind(),
        "daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        ctx: ServerContext::new(assembly.engine, assembly.breaker),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    for path in [
        &config.socket_path,
        &config.version_path,
        &config.lock_path,
    ] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
