// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-side runtime: what runs inside one execution unit.
//!
//! [`run_unit`] owns the account's transport and scheduler registry, logs in,
//! answers control-channel calls, and reports status until it is told to stop
//! or the session is ended by the server.

use crate::error::UnitError;
use async_trait::async_trait;
use fh_adapters::{UnitEndpoint, UnitSpec};
use fh_core::{
    epoch_ms, Account, ConfigSnapshot, ControlMessage, LogEntry, LogLevel, RecurringOptions,
    Scheduler, SchedulerRegistry, UnitMessage,
};
use fh_transport::{
    ConnectionEvent, Connector, Handshake, Phase, PushChannel, Transport, TransportConfig,
    TransportStats,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const TRANSPORT_NAMESPACE: &str = "transport";
const DOMAIN_NAMESPACE: &str = "unit";
const RUNTIME_NAMESPACE: &str = "unit-runtime";
const STATUS_TASK: &str = "status_report";

/// Domain API served by a unit. Game logic plugs in here.
#[async_trait]
pub trait UnitApi: Send + Sync + 'static {
    /// Apply a configuration snapshot. Called once at boot and on every sync.
    async fn apply_config(&self, _config: &ConfigSnapshot) {}

    /// Answer a call from the engine
    async fn call(&self, method: &str, args: &[serde_json::Value])
        -> Result<serde_json::Value, String>;

    /// Domain part of the periodic status report
    fn status(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// API with no domain methods
#[derive(Debug, Clone, Copy, Default)]
pub struct NullApi;

#[async_trait]
impl UnitApi for NullApi {
    async fn call(
        &self,
        method: &str,
        _args: &[serde_json::Value],
    ) -> Result<serde_json::Value, String> {
        Err(format!("unknown method: {}", method))
    }
}

/// Sends log entries up the control channel, tagged with the account
#[derive(Clone)]
pub struct UnitLogger {
    events: mpsc::UnboundedSender<UnitMessage>,
    account_id: String,
    account_name: String,
}

impl UnitLogger {
    fn new(events: mpsc::UnboundedSender<UnitMessage>, account: &Account) -> Self {
        Self {
            events,
            account_id: account.id.clone(),
            account_name: account.display_name().to_string(),
        }
    }

    fn entry(&self, level: LogLevel, tag: &str, message: String) -> LogEntry {
        LogEntry::new(level, tag, message).for_account(&self.account_id, &self.account_name)
    }

    /// Global log
    pub fn log(&self, level: LogLevel, tag: &str, message: impl Into<String>) {
        let entry = self.entry(level, tag, message.into());
        let _ = self.events.send(UnitMessage::Log { entry });
    }

    /// Account log, shown in the account's own history
    pub fn account_log(&self, level: LogLevel, tag: &str, message: impl Into<String>) {
        let entry = self.entry(level, tag, message.into());
        let _ = self.events.send(UnitMessage::AccountLog { entry });
    }

    fn send(&self, message: UnitMessage) {
        let _ = self.events.send(message);
    }
}

/// Handles given to the domain API when it is built
pub struct UnitContext<C: Connector> {
    pub account: Account,
    pub transport: Transport<C>,
    /// Namespace for domain timers
    pub scheduler: Scheduler,
    pub logger: UnitLogger,
}

/// Settings for the unit runtime
#[derive(Clone)]
pub struct UnitOptions<C: Connector> {
    pub connector: C,
    pub handshake: Arc<dyn Handshake>,
    pub transport: TransportConfig,
    pub status_interval: Duration,
    /// End the unit when the transport halts on an authentication failure
    pub exit_on_halt: bool,
}

impl<C: Connector> UnitOptions<C> {
    pub fn new(connector: C, handshake: Arc<dyn Handshake>, transport: TransportConfig) -> Self {
        Self {
            connector,
            handshake,
            transport,
            status_interval: Duration::from_secs(5),
            exit_on_halt: true,
        }
    }
}

/// Status document reported to the engine
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub account_id: String,
    pub account_name: String,
    pub phase: Phase,
    pub connection: TransportStats,
    pub config_revision: u64,
    pub domain: serde_json::Value,
    pub reported_at_ms: u64,
}

struct Reporter<C: Connector, A> {
    account: Account,
    transport: Transport<C>,
    api: Arc<A>,
    logger: UnitLogger,
    revision: AtomicU64,
}

impl<C: Connector, A: UnitApi> Reporter<C, A> {
    fn build(&self) -> UnitStatus {
        let connection = self.transport.stats();
        UnitStatus {
            account_id: self.account.id.clone(),
            account_name: self.account.display_name().to_string(),
            phase: connection.phase,
            connection,
            config_revision: self.revision.load(Ordering::Relaxed),
            domain: self.api.status(),
            reported_at_ms: epoch_ms(),
        }
    }

    fn report(&self) {
        match serde_json::to_value(self.build()) {
            Ok(status) => self.logger.send(UnitMessage::Status { status }),
            Err(e) => tracing::warn!(error = %e, "failed to encode status"),
        }
    }

    fn on_connection(&self, event: &ConnectionEvent) {
        let logger = &self.logger;
        match event {
            ConnectionEvent::Connecting => {}
            ConnectionEvent::Ready => logger.account_log(LogLevel::Info, "connection", "connected"),
            ConnectionEvent::Closed { reason } => logger.account_log(
                LogLevel::Warn,
                "connection",
                format!("connection closed: {}", reason),
            ),
            ConnectionEvent::Stale { misses } => logger.account_log(
                LogLevel::Warn,
                "heartbeat",
                format!("no heartbeat reply ({} missed)", misses),
            ),
            ConnectionEvent::Reconnecting => {
                logger.account_log(LogLevel::Info, "connection", "reconnecting")
            }
            ConnectionEvent::Halted { reason } => logger.account_log(
                LogLevel::Error,
                "connection",
                format!("halted: {}", reason),
            ),
        }
        self.report();
    }
}

/// Run one account's session until stopped.
///
/// Returns `Ok` on a requested stop (or when the engine hangs up) and an
/// error when the session ends on its own: a kickout, or an authentication
/// halt when `exit_on_halt` is set. Either way every timer is cancelled and
/// the transport shut down before returning.
pub async fn run_unit<C, A, B>(
    spec: UnitSpec,
    endpoint: UnitEndpoint,
    options: UnitOptions<C>,
    build_api: B,
) -> Result<(), UnitError>
where
    C: Connector,
    A: UnitApi,
    B: FnOnce(&UnitContext<C>) -> A,
{
    let UnitEndpoint {
        mut control,
        events,
    } = endpoint;
    let account = spec.account.clone();

    let registry = SchedulerRegistry::new();
    let transport = Transport::new(
        options.transport,
        options.connector,
        options.handshake,
        registry.scheduler(TRANSPORT_NAMESPACE),
    );
    let logger = UnitLogger::new(events, &account);
    let context = UnitContext {
        account: account.clone(),
        transport: transport.clone(),
        scheduler: registry.scheduler(DOMAIN_NAMESPACE),
        logger: logger.clone(),
    };
    let api = Arc::new(build_api(&context));
    api.apply_config(&spec.config).await;

    let reporter = Arc::new(Reporter {
        account: account.clone(),
        transport: transport.clone(),
        api: Arc::clone(&api),
        logger: logger.clone(),
        revision: AtomicU64::new(spec.config.revision),
    });

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    transport.push().on(PushChannel::Kickout, move |_| {
        let _ = ended_tx.send(UnitError::Kicked);
    });

    let runtime = registry.scheduler(RUNTIME_NAMESPACE);
    let periodic = Arc::clone(&reporter);
    let scheduled = runtime.set_recurring(
        STATUS_TASK,
        options.status_interval,
        RecurringOptions::default(),
        move || {
            let reporter = Arc::clone(&periodic);
            async move {
                reporter.report();
                Ok::<(), Infallible>(())
            }
        },
    );
    if let Err(e) = scheduled {
        tracing::warn!(error = %e, "status reporting disabled");
    }

    let mut connection = transport.subscribe();
    let login = {
        let transport = transport.clone();
        let credentials = account.credentials.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.connect(credentials).await {
                tracing::warn!(error = %e, "initial login failed");
            }
        })
    };

    logger.log(LogLevel::Info, "system", "unit started");
    reporter.report();

    let mut connection_open = true;
    let outcome = loop {
        tokio::select! {
            message = control.recv() => match message {
                Some(ControlMessage::Stop) | None => break Ok(()),
                Some(ControlMessage::ConfigSync { config }) => {
                    api.apply_config(&config).await;
                    reporter.revision.store(config.revision, Ordering::Relaxed);
                    logger.log(
                        LogLevel::Info,
                        "config",
                        format!("applied config revision {}", config.revision),
                    );
                }
                Some(ControlMessage::Call { id, method, args }) => {
                    tokio::spawn(answer_call(
                        id,
                        method,
                        args,
                        Arc::clone(&api),
                        Arc::clone(&reporter),
                        registry.clone(),
                    ));
                }
            },
            event = connection.recv(), if connection_open => match event {
                Ok(event) => {
                    reporter.on_connection(&event);
                    if let ConnectionEvent::Halted { reason } = event {
                        if options.exit_on_halt {
                            break Err(UnitError::Halted(reason));
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "connection events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => connection_open = false,
            },
            Some(reason) = ended_rx.recv() => break Err(reason),
        }
    };

    login.abort();
    transport.shutdown();
    for namespace in registry.namespaces() {
        registry.scheduler(namespace).cancel_all();
    }
    reporter.report();
    match &outcome {
        Ok(()) => logger.log(LogLevel::Info, "system", "unit stopped"),
        Err(e) => logger.account_log(LogLevel::Error, "system", format!("unit ending: {}", e)),
    }
    outcome
}

async fn answer_call<C: Connector, A: UnitApi>(
    id: String,
    method: String,
    args: Vec<serde_json::Value>,
    api: Arc<A>,
    reporter: Arc<Reporter<C, A>>,
    registry: SchedulerRegistry,
) {
    let result = match method.as_str() {
        "getSchedulers" => serde_json::to_value(registry.snapshot(None)).map_err(|e| e.to_string()),
        "getStatus" => serde_json::to_value(reporter.build()).map_err(|e| e.to_string()),
        _ => api.call(&method, &args).await,
    };
    let reply = match result {
        Ok(data) => UnitMessage::call_ok(id, data),
        Err(e) => UnitMessage::call_err(id, e),
    };
    reporter.logger.send(reply);
}

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;
