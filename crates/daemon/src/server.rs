// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::Instant;

use fh_adapters::{ExecutionUnitFactory, NotifyAdapter};
use fh_core::CircuitBreaker;
use fh_engine::{RuntimeEngine, UnitState};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// What every connection handler shares
pub struct ServerContext<F, N> {
    pub engine: Arc<RuntimeEngine<F, N>>,
    pub breaker: Option<Arc<CircuitBreaker>>,
    pub start_time: Instant,
    /// Signalled by a `Shutdown` request
    pub shutdown: Arc<Notify>,
}

impl<F, N> Clone for ServerContext<F, N> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            breaker: self.breaker.clone(),
            start_time: self.start_time,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<F, N> ServerContext<F, N> {
    pub fn new(engine: Arc<RuntimeEngine<F, N>>, breaker: Option<Arc<CircuitBreaker>>) -> Self {
        Self {
            engine,
            breaker,
            start_time: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Handle a single client connection: one request, one response
pub async fn handle_connection<F, N, S>(
    ctx: &ServerContext<F, N>,
    stream: S,
) -> Result<(), ServerError>
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before sending request");
            return Ok(());
        }
        Err(protocol::ProtocolError::Json(e)) => {
            // Malformed requests still get an answer
            let response = Response::error(format!("invalid request: {}", e));
            protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "failed to read request");
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");
    let response = handle_request(ctx, request).await;
    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<F, N>(ctx: &ServerContext<F, N>, request: Request) -> Response
where
    F: ExecutionUnitFactory,
    N: NotifyAdapter,
{
    let engine = &ctx.engine;
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                debug!(client = %version, daemon = PROTOCOL_VERSION, "client version differs");
            }
            Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }

        Request::Status => {
            let accounts = engine.accounts().list_accounts();
            let crashed = accounts
                .iter()
                .filter_map(|a| engine.last_exit(&a.id))
                .filter(|r| r.state == UnitState::Crashed)
                .collect();
            Response::Status {
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                mode: engine.kind(),
                accounts: accounts.len(),
                units: engine.units(),
                crashed,
            }
        }

        Request::StartAccount { account_id } => match engine.start_account(&account_id).await {
            Ok(changed) => Response::Account {
                account_id,
                changed,
            },
            Err(e) => Response::error(e),
        },

        Request::StopAccount { account_id } => {
            let changed = engine.stop_account(&account_id);
            Response::Account {
                account_id,
                changed,
            }
        }

        Request::RestartAccount { account_id } => {
            match engine.restart_account(&account_id).await {
                Ok(changed) => Response::Account {
                    account_id,
                    changed,
                },
                Err(e) => Response::error(e),
            }
        }

        Request::StartAll => Response::Started {
            summary: engine.start_all_accounts().await,
        },

        Request::StopAll => Response::Stopped {
            count: engine.stop_all_accounts(),
        },

        Request::RestartAll => Response::Started {
            summary: engine.restart_all_accounts().await,
        },

        Request::IsRunning { account_id } => {
            let running = engine.is_account_running(&account_id);
            Response::Running {
                account_id,
                running,
            }
        }

        Request::SchedulerStatus { account_id } => Response::Schedulers {
            status: engine.scheduler_status(&account_id).await,
        },

        Request::CallUnit {
            account_id,
            method,
            args,
        } => match engine.call_unit_api(&account_id, &method, args).await {
            Ok(data) => Response::UnitResult { data },
            Err(e) => Response::error(e),
        },

        Request::BroadcastConfig { account_id } => Response::Broadcast {
            delivered: engine.broadcast_config(account_id.as_deref()).await,
        },

        Request::Logs { filter } => Response::Logs {
            entries: engine.logs(&filter),
        },

        Request::AccountLogs { filter } => Response::Logs {
            entries: engine.account_logs(&filter),
        },

        Request::BreakerStatus => match &ctx.breaker {
            Some(breaker) => Response::Breaker {
                status: breaker.status(),
            },
            None => Response::error("config source not configured"),
        },

        Request::BreakerReset => match &ctx.breaker {
            Some(breaker) => {
                breaker.reset();
                Response::Breaker {
                    status: breaker.status(),
                }
            }
            None => Response::error("config source not configured"),
        },

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
