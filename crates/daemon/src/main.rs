// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fieldhand daemon (fhd)
//!
//! `fhd run` supervises one execution unit per account and serves the local
//! control socket. `fhd unit` is the child side of process mode. `fhd ctl`
//! sends one request to a running daemon.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use fh_daemon::client::DaemonClient;
use fh_daemon::lifecycle::{self, Config, LifecycleError};
use fh_daemon::{jobs, server, units, wiring, Request, Response, Settings};

#[derive(Parser)]
#[command(name = "fhd", version, about = "fieldhand - supervised game sessions per account")]
struct Cli {
    /// Settings file (defaults to $FIELDHAND_CONFIG, then ./fieldhand.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run,
    /// Serve one account over stdin/stdout (spawned by the daemon)
    Unit,
    /// Send one JSON request to the running daemon, e.g. '{"type":"status"}'
    Ctl {
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, settings_path) = Settings::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => run(settings, settings_path).await,
        Commands::Unit => {
            setup_stderr_logging();
            units::run_child(&settings).await?;
            Ok(())
        }
        Commands::Ctl { request } => ctl(&settings, &request).await,
    }
}

async fn run(settings: Settings, settings_path: Option<PathBuf>) -> Result<()> {
    let config = Config::from_settings(&settings)?;

    // Write startup marker to log (before tracing setup, so it is findable)
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    match &settings_path {
        Some(path) => info!(settings = %path.display(), mode = %settings.mode, "starting fhd"),
        None => info!(mode = %settings.mode, "starting fhd with default settings"),
    }

    let assembly = wiring::build_engine(&settings, settings_path.as_deref())
        .context("failed to build runtime engine")?;
    let daemon = match lifecycle::startup(&config, assembly).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    jobs::install(&daemon.ctx.engine, daemon.ctx.breaker.clone(), &settings.jobs)?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");

    // Signal ready for parent process (e.g., systemd)
    println!("READY");

    if settings.autostart {
        let engine = std::sync::Arc::clone(&daemon.ctx.engine);
        tokio::spawn(async move {
            let summary = engine.start_all_accounts().await;
            info!(
                started = summary.started.len(),
                already_running = summary.already_running.len(),
                failed = summary.failed.len(),
                "autostart finished"
            );
            for (account_id, reason) in summary.failed {
                warn!(%account_id, %reason, "account failed to start");
            }
        });
    }

    let shutdown = std::sync::Arc::clone(&daemon.ctx.shutdown);
    loop {
        tokio::select! {
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let ctx = daemon.ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(&ctx, stream).await {
                                error!("error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("error accepting connection: {}", e);
                    }
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }

            _ = shutdown.notified() => {
                info!("shutdown requested via control socket");
                break;
            }
        }
    }

    daemon.shutdown().await;
    info!("daemon stopped");
    drop(log_guard);
    Ok(())
}

async fn ctl(settings: &Settings, request: &str) -> Result<()> {
    let request: Request =
        serde_json::from_str(request).context("request must be a JSON control request")?;
    let config = Config::from_settings(settings)?;
    let client = DaemonClient::connect(&config.socket_path)?
        .with_unit_call_timeout(settings.orchestrator.engine.call_timeout);
    let response = client.send(&request).await?;
    if let Response::Error { message } = response {
        bail!(message);
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- fhd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- fhd: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    std::fs::create_dir_all(&config.state_dir)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(
        &config.state_dir,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

/// Unit children log to stderr; stdout carries the control channel
fn setup_stderr_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();
}
