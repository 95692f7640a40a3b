// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution unit wiring: what runs inside a unit, and how the host
//! launches one in each deployment mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fh_adapters::{
    attach_stdio, LaunchError, ProcessConfig, ProcessUnitFactory, StdioUnit, ThreadUnitFactory,
    UnitEndpoint, UnitEntry, UnitFactory, UnitKind, UnitSpec,
};
use fh_engine::{run_unit, NullApi, UnitError, UnitOptions};
use fh_transport::{JsonHandshake, WsConnector};
use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::settings::Settings;

/// How long a child waits for its last messages to reach stdout
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ChildError {
    #[error(transparent)]
    Bootstrap(#[from] LaunchError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Unit runtime options derived from settings
pub fn unit_options(settings: &Settings) -> UnitOptions<WsConnector> {
    let mut options = UnitOptions::new(
        WsConnector::new(settings.gateway.clone()),
        Arc::new(JsonHandshake::new(settings.gateway.client_version.clone())),
        settings.transport.clone(),
    );
    options.status_interval = settings.orchestrator.status_interval;
    options.exit_on_halt = settings.orchestrator.exit_on_halt;
    options
}

/// Entry run on each thread unit's own runtime
pub fn thread_entry(settings: &Settings) -> UnitEntry {
    let options = unit_options(settings);
    Arc::new(
        move |spec: UnitSpec, endpoint: UnitEndpoint| -> BoxFuture<'static, Result<(), String>> {
            let options = options.clone();
            async move {
                run_unit(spec, endpoint, options, |_| NullApi)
                    .await
                    .map_err(|e| e.to_string())
            }
            .boxed()
        },
    )
}

/// Child command line: this binary's `unit` subcommand with the same settings
pub fn process_config(
    program: PathBuf,
    settings_path: Option<&Path>,
    settings: &Settings,
) -> ProcessConfig {
    let mut args = Vec::new();
    if let Some(path) = settings_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args.push("unit".to_string());
    ProcessConfig::new(program, args).with_stop_grace(settings.orchestrator.stop_grace)
}

/// Factory for the configured deployment mode
pub fn unit_factory(
    settings: &Settings,
    settings_path: Option<&Path>,
) -> Result<UnitFactory, std::io::Error> {
    match settings.mode {
        UnitKind::Thread => Ok(UnitFactory::Thread(ThreadUnitFactory::new(thread_entry(
            settings,
        )))),
        UnitKind::Process => {
            let program = std::env::current_exe()?;
            Ok(UnitFactory::Process(ProcessUnitFactory::new(process_config(
                program,
                settings_path,
                settings,
            ))))
        }
    }
}

/// Body of `fhd unit`: serve one account over stdin/stdout
pub async fn run_child(settings: &Settings) -> Result<(), ChildError> {
    let StdioUnit {
        spec,
        endpoint,
        writer,
    } = attach_stdio().await?;
    tracing::info!(account_id = %spec.account_id(), "unit process attached");

    let result = run_unit(spec, endpoint, unit_options(settings), |_| NullApi).await;
    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        tracing::warn!("unit output not drained before exit");
    }
    Ok(result?)
}

#[cfg(test)]
#[path = "units_tests.rs"]
mod tests;
