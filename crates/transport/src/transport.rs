// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle, request correlation, and heartbeats

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use bytes::Bytes;
use fh_core::{epoch_ms, Credentials, RecurringOptions, Scheduler};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{CallError, TransportError};
use crate::frame::{Frame, MessageKind};
use crate::handshake::{Handshake, Outbound};
use crate::limiter::{Lane, RateLimitConfig, RateLimiter, SendTask};
use crate::link::{Connector, LinkEvent};
use crate::pending::{PendingCall, PendingCalls, ReplySink};
use crate::push::{PushChannel, PushDispatcher, PushEvent};

const HEARTBEAT_TASK: &str = "heartbeat_interval";
const RECONNECT_TASK: &str = "auto_reconnect";

fn timeout_task(seq: u64) -> String {
    format!("request_timeout_{seq}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(flatten)]
    pub rate: RateLimitConfig,
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub login_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Silence after which a heartbeat tick counts as a miss
    #[serde(with = "humantime_serde")]
    pub heartbeat_stale_after: Duration,
    /// Consecutive misses that force pending calls out and reconnect
    pub heartbeat_max_misses: u32,
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Duration,
    pub auto_reconnect: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rate: RateLimitConfig::default(),
            call_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_stale_after: Duration::from_secs(60),
            heartbeat_max_misses: 2,
            reconnect_backoff: Duration::from_secs(5),
            auto_reconnect: true,
        }
    }
}

/// Successful response to a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub body: Bytes,
    pub server_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// Link opening or login in progress
    Connecting,
    Ready,
    /// Link lost; a reconnect may be scheduled
    Closed,
    /// Authentication rejected; no further reconnects
    Halted,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Ready,
    Closed { reason: String },
    Stale { misses: u32 },
    Reconnecting,
    Halted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub phase: Phase,
    /// Last sequence number assigned to an outbound frame
    pub client_seq: u64,
    /// Highest sequence number seen from the server
    pub server_seq: u64,
    pub pending: usize,
    pub urgent_depth: usize,
    pub normal_depth: usize,
    pub sent: u64,
    pub unmatched: u64,
    pub reconnects: u64,
    /// Server clock minus local clock, once a reply carried the server time
    pub clock_offset_ms: Option<i64>,
}

struct ConnState {
    phase: Phase,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    client_seq: u64,
    server_seq: u64,
    pending: PendingCalls,
    credentials: Option<Credentials>,
    last_heartbeat_ok: Instant,
    misses: u32,
    unmatched: u64,
    reconnects: u64,
    clock_offset_ms: Option<i64>,
}

struct Inner<C: Connector> {
    config: TransportConfig,
    connector: C,
    handshake: Arc<dyn Handshake>,
    scheduler: Scheduler,
    limiter: RateLimiter,
    push: PushDispatcher,
    events: broadcast::Sender<ConnectionEvent>,
    conn: Mutex<ConnState>,
}

/// Rate-limited, self-healing connection to the game gateway.
///
/// Timers (request timeouts, heartbeat, reconnect) live in the scheduler
/// namespace handed to [`Transport::new`], which the transport owns.
pub struct Transport<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Transport<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> Transport<C> {
    pub fn new(
        config: TransportConfig,
        connector: C,
        handshake: Arc<dyn Handshake>,
        scheduler: Scheduler,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let limiter = RateLimiter::new(config.rate.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                handshake,
                scheduler,
                limiter,
                push: PushDispatcher::new(),
                events,
                conn: Mutex::new(ConnState {
                    phase: Phase::Idle,
                    generation: 0,
                    outbound: None,
                    client_seq: 0,
                    server_seq: 0,
                    pending: PendingCalls::default(),
                    credentials: None,
                    last_heartbeat_ok: Instant::now(),
                    misses: 0,
                    unmatched: 0,
                    reconnects: 0,
                    clock_offset_ms: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn push(&self) -> &PushDispatcher {
        &self.inner.push
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    pub fn stats(&self) -> TransportStats {
        let (urgent_depth, normal_depth) = self.inner.limiter.depth();
        let sent = self.inner.limiter.sent();
        let conn = self.inner.lock();
        TransportStats {
            phase: conn.phase,
            client_seq: conn.client_seq,
            server_seq: conn.server_seq,
            pending: conn.pending.len(),
            urgent_depth,
            normal_depth,
            sent,
            unmatched: conn.unmatched,
            reconnects: conn.reconnects,
            clock_offset_ms: conn.clock_offset_ms,
        }
    }

    /// Current time on the server's clock, in epoch milliseconds. Falls back
    /// to the local clock until the server has reported its time.
    pub fn server_now_ms(&self) -> u64 {
        let offset = self.inner.lock().clock_offset_ms.unwrap_or(0);
        epoch_ms().saturating_add_signed(offset)
    }

    /// Open the link and log in. Resolves with the login reply.
    ///
    /// Replaces any existing link. On a retryable failure a reconnect is
    /// still scheduled, so callers may treat the error as informational.
    pub async fn connect(&self, credentials: Credentials) -> Result<Reply, TransportError> {
        {
            let mut conn = self.inner.lock();
            if conn.phase == Phase::Shutdown {
                return Err(TransportError::Shutdown);
            }
            conn.credentials = Some(credentials);
            conn.outbound = None;
            conn.phase = Phase::Connecting;
        }
        self.inner.scheduler.cancel(RECONNECT_TASK);
        self.inner.scheduler.cancel(HEARTBEAT_TASK);
        self.inner.establish().await
    }

    /// Normal-lane call with the configured timeout
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        body: Bytes,
    ) -> Result<Reply, CallError> {
        let timeout = self.inner.config.call_timeout;
        self.inner
            .request(Outbound::new(service, method, body), Lane::Normal, timeout)
            .await
    }

    /// Urgent-lane call, for latency-sensitive operations
    pub async fn call_urgent(
        &self,
        service: &str,
        method: &str,
        body: Bytes,
    ) -> Result<Reply, CallError> {
        let timeout = self.inner.config.call_timeout;
        self.inner
            .request(Outbound::new(service, method, body), Lane::Urgent, timeout)
            .await
    }

    pub async fn call_with_timeout(
        &self,
        service: &str,
        method: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<Reply, CallError> {
        self.inner
            .request(Outbound::new(service, method, body), Lane::Normal, timeout)
            .await
    }

    /// Tear down for good: pending calls are rejected, queues cleared, and
    /// every timer in the transport's namespace cancelled.
    pub fn shutdown(&self) {
        let seqs = {
            let mut conn = self.inner.lock();
            conn.phase = Phase::Shutdown;
            conn.outbound = None;
            conn.pending.fail_all(|_| CallError::Shutdown)
        };
        let discarded = self.inner.limiter.clear();
        let timers = self.inner.scheduler.cancel_all();
        tracing::info!(
            rejected = seqs.len(),
            discarded,
            timers,
            "transport shut down"
        );
    }
}

impl<C: Connector> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    async fn establish(self: &Arc<Self>) -> Result<Reply, TransportError> {
        let (credentials, previous) = {
            let conn = self.lock();
            match (&conn.phase, &conn.credentials) {
                (Phase::Shutdown, _) => return Err(TransportError::Shutdown),
                (Phase::Halted, _) | (_, None) => return Err(TransportError::Halted),
                (_, Some(credentials)) => (credentials.clone(), conn.generation),
            }
        };
        self.emit(ConnectionEvent::Connecting);

        let link = match self.connector.open(&credentials).await {
            Ok(link) => link,
            Err(e) => {
                let error = TransportError::Link(e);
                self.on_establish_failed(previous, &error);
                return Err(error);
            }
        };

        let generation = {
            let mut conn = self.lock();
            if conn.phase == Phase::Shutdown {
                return Err(TransportError::Shutdown);
            }
            conn.generation += 1;
            conn.outbound = Some(link.outbound);
            conn.phase = Phase::Connecting;
            conn.generation
        };
        tokio::spawn(read_loop(Arc::downgrade(self), generation, link.inbound));

        let login = self.handshake.login(&credentials);
        let result = self
            .request(login, Lane::Urgent, self.config.login_timeout)
            .await;
        match result {
            Ok(reply) => {
                {
                    let mut conn = self.lock();
                    if conn.generation != generation || conn.phase != Phase::Connecting {
                        return Err(TransportError::Login(CallError::Disconnected {
                            method: "login".to_string(),
                        }));
                    }
                    conn.phase = Phase::Ready;
                }
                if let Some(server_ms) = self.handshake.login_server_time(&reply.body) {
                    self.sync_server_time(server_ms);
                }
                tracing::info!(generation, "logged in");
                self.emit(ConnectionEvent::Ready);
                self.start_heartbeat();
                Ok(reply)
            }
            Err(CallError::Remote { code, message, .. }) => {
                let error = TransportError::AuthRejected { code, message };
                self.on_establish_failed(generation, &error);
                Err(error)
            }
            Err(e) => {
                let error = TransportError::Login(e);
                self.on_establish_failed(generation, &error);
                Err(error)
            }
        }
    }

    /// A connect attempt for link `generation` failed. Ignored when a newer
    /// attempt already owns the connection.
    fn on_establish_failed(self: &Arc<Self>, generation: u64, error: &TransportError) {
        {
            let mut conn = self.lock();
            if conn.generation != generation
                || matches!(conn.phase, Phase::Halted | Phase::Shutdown)
            {
                return;
            }
            conn.outbound = None;
            if !error.is_auth() {
                conn.phase = Phase::Closed;
            }
        }
        if error.is_auth() {
            self.halt(&error.to_string());
            return;
        }
        let discarded = self.limiter.clear();
        self.scheduler.cancel(HEARTBEAT_TASK);
        tracing::warn!(error = %error, discarded, "connect failed");
        self.emit(ConnectionEvent::Closed {
            reason: error.to_string(),
        });
        self.schedule_reconnect();
    }

    fn sync_server_time(&self, server_ms: u64) {
        let offset = i64::try_from(server_ms).unwrap_or(i64::MAX) - epoch_ms() as i64;
        self.lock().clock_offset_ms = Some(offset);
        tracing::debug!(server_ms, offset_ms = offset, "server time synced");
    }

    fn halt(&self, reason: &str) {
        {
            let mut conn = self.lock();
            conn.phase = Phase::Halted;
            conn.outbound = None;
        }
        self.limiter.clear();
        self.scheduler.cancel(HEARTBEAT_TASK);
        self.scheduler.cancel(RECONNECT_TASK);
        tracing::error!(reason, "authentication rejected, transport halted");
        self.emit(ConnectionEvent::Halted {
            reason: reason.to_string(),
        });
    }

    /// Link `generation` went away. Queued sends are discarded; pending
    /// calls are left to their own timeouts.
    fn on_closed(self: &Arc<Self>, generation: u64, reason: &str) {
        {
            let mut conn = self.lock();
            if conn.generation != generation || conn.outbound.is_none() {
                return;
            }
            conn.outbound = None;
            if matches!(conn.phase, Phase::Halted | Phase::Shutdown) {
                return;
            }
            conn.phase = Phase::Closed;
        }
        let discarded = self.limiter.clear();
        self.scheduler.cancel(HEARTBEAT_TASK);
        tracing::warn!(reason, discarded, "connection closed");
        self.emit(ConnectionEvent::Closed {
            reason: reason.to_string(),
        });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.auto_reconnect {
            return;
        }
        let weak = Arc::downgrade(self);
        let result = self.scheduler.set_once(
            RECONNECT_TASK,
            self.config.reconnect_backoff,
            move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.reconnect().await;
                }
                Ok::<(), Infallible>(())
            },
        );
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to schedule reconnect");
        }
    }

    async fn reconnect(self: &Arc<Self>) {
        {
            let mut conn = self.lock();
            if conn.phase != Phase::Closed {
                return;
            }
            conn.phase = Phase::Connecting;
            conn.reconnects += 1;
        }
        tracing::info!("attempting reconnect");
        self.emit(ConnectionEvent::Reconnecting);
        if let Err(e) = self.establish().await {
            tracing::warn!(error = %e, "reconnect failed");
        }
    }

    async fn request(
        self: &Arc<Self>,
        outbound: Outbound,
        lane: Lane,
        timeout: Duration,
    ) -> Result<Reply, CallError> {
        let method = outbound.method_key();
        if self.lock().outbound.is_none() {
            return Err(CallError::NotConnected { method });
        }

        let (tx, rx) = oneshot::channel();
        let weak = Arc::downgrade(self);
        let task: SendTask = Box::new(move || match weak.upgrade() {
            Some(inner) => inner.send_now(outbound, timeout, tx),
            None => {
                let _ = tx.send(Err(CallError::Shutdown));
            }
        });
        match lane {
            Lane::Urgent => self.limiter.enqueue_urgent(task),
            Lane::Normal => self.limiter.enqueue(task),
        }

        rx.await
            .unwrap_or(Err(CallError::Discarded { method }))
    }

    /// Runs on the drain loop: assign a sequence number, register the
    /// pending call and its timeout, then write the frame.
    fn send_now(self: &Arc<Self>, outbound: Outbound, timeout: Duration, sink: ReplySink) {
        let method = outbound.method_key();
        let mut conn = self.lock();
        let Some(link) = conn.outbound.clone() else {
            let _ = sink.send(Err(CallError::Disconnected { method }));
            return;
        };

        conn.client_seq += 1;
        let seq = conn.client_seq;
        let frame = Frame::request(
            outbound.service,
            outbound.method,
            seq,
            conn.server_seq,
            outbound.body,
        );
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(seq, method, error = %e, "failed to encode request");
                let _ = sink.send(Err(CallError::SendFailed { method }));
                return;
            }
        };

        conn.pending.insert(
            seq,
            PendingCall {
                method: method.clone(),
                sink,
            },
        );
        let weak = Arc::downgrade(self);
        let scheduled = self
            .scheduler
            .set_once(timeout_task(seq), timeout, move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(seq);
                }
                Ok::<(), Infallible>(())
            });
        if let Err(e) = scheduled {
            tracing::error!(seq, error = %e, "failed to schedule request timeout");
        }

        if link.send(bytes).is_err() {
            if let Some(call) = conn.pending.take(seq) {
                let _ = call.sink.send(Err(CallError::SendFailed { method }));
            }
            self.scheduler.cancel(&timeout_task(seq));
            return;
        }
        tracing::trace!(seq, method, "request sent");
    }

    fn expire(&self, seq: u64) {
        let mut conn = self.lock();
        let Some(call) = conn.pending.take(seq) else {
            return;
        };
        let pending = conn.pending.len();
        tracing::warn!(seq, method = %call.method, pending, "request timed out");
        let _ = call.sink.send(Err(CallError::Timeout {
            method: call.method,
            seq,
            pending,
        }));
    }

    fn on_frame(&self, generation: u64, bytes: &[u8]) {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        let meta = &frame.meta;

        let mut conn = self.lock();
        if conn.generation != generation {
            return;
        }
        conn.server_seq = conn.server_seq.max(meta.server_seq);

        match meta.kind {
            MessageKind::Response => {
                let seq = meta.client_seq;
                let Some(call) = conn.pending.take(seq) else {
                    conn.unmatched += 1;
                    if meta.error_code != 0 {
                        tracing::warn!(
                            seq,
                            method = %meta.method_key(),
                            code = meta.error_code,
                            message = %meta.error_message,
                            "unmatched error response"
                        );
                    } else {
                        tracing::debug!(seq, method = %meta.method_key(), "unmatched response");
                    }
                    return;
                };
                drop(conn);
                self.scheduler.cancel(&timeout_task(seq));
                let result = if meta.error_code != 0 {
                    Err(CallError::Remote {
                        method: meta.method_key(),
                        code: meta.error_code,
                        message: meta.error_message.clone(),
                    })
                } else {
                    Ok(Reply {
                        body: frame.body.clone(),
                        server_seq: meta.server_seq,
                    })
                };
                let _ = call.sink.send(result);
            }
            MessageKind::Notify => {
                drop(conn);
                match PushEvent::decode(&frame.body) {
                    Ok(event) => {
                        if event.channel() == Some(PushChannel::Kickout) {
                            tracing::warn!(tag = event.tag(), "kicked out by server");
                        }
                        self.push.dispatch(&event);
                    }
                    Err(e) => tracing::warn!(error = %e, "undecodable push"),
                }
            }
            MessageKind::Request => {
                tracing::debug!(method = %meta.method_key(), "ignoring request from server");
            }
        }
    }

    fn start_heartbeat(self: &Arc<Self>) {
        {
            let mut conn = self.lock();
            conn.last_heartbeat_ok = Instant::now();
            conn.misses = 0;
        }
        let weak = Arc::downgrade(self);
        let result = self.scheduler.set_recurring(
            HEARTBEAT_TASK,
            self.config.heartbeat_interval,
            RecurringOptions::default(),
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.heartbeat_tick();
                    }
                    Ok::<(), Infallible>(())
                }
            },
        );
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to start heartbeat");
        }
    }

    fn heartbeat_tick(self: &Arc<Self>) {
        let (generation, stale) = {
            let mut conn = self.lock();
            if conn.phase != Phase::Ready {
                return;
            }
            let silent = Instant::now().duration_since(conn.last_heartbeat_ok);
            let mut stale = None;
            if silent > self.config.heartbeat_stale_after {
                conn.misses += 1;
                tracing::warn!(
                    silent_ms = silent.as_millis() as u64,
                    pending = conn.pending.len(),
                    misses = conn.misses,
                    "no heartbeat reply, connection may be dead"
                );
                if conn.misses >= self.config.heartbeat_max_misses {
                    stale = Some((conn.misses, conn.pending.fail_all(|_| CallError::Stale)));
                }
            }
            (conn.generation, stale)
        };

        if let Some((misses, seqs)) = stale {
            for seq in &seqs {
                self.scheduler.cancel(&timeout_task(*seq));
            }
            tracing::warn!(misses, flushed = seqs.len(), "connection stale, reconnecting");
            self.emit(ConnectionEvent::Stale { misses });
            self.on_closed(generation, "heartbeat stale");
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let heartbeat = inner.handshake.heartbeat();
            let timeout = inner.config.call_timeout;
            match inner.request(heartbeat, Lane::Urgent, timeout).await {
                Ok(reply) => {
                    {
                        let mut conn = inner.lock();
                        conn.last_heartbeat_ok = Instant::now();
                        conn.misses = 0;
                    }
                    if let Some(server_ms) = inner.handshake.heartbeat_server_time(&reply.body) {
                        inner.sync_server_time(server_ms);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "heartbeat failed"),
            }
        });
    }
}

async fn read_loop<C: Connector>(
    inner: Weak<Inner<C>>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            LinkEvent::Frame(bytes) => inner.on_frame(generation, &bytes),
            LinkEvent::Closed { code, reason } => {
                let reason = match code {
                    Some(code) => format!("closed by server (code={code}) {reason}"),
                    None => format!("closed: {reason}"),
                };
                inner.on_closed(generation, reason.trim_end());
                return;
            }
            LinkEvent::Failed { message } => {
                inner.on_closed(generation, &format!("link failed: {message}"));
                return;
            }
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.on_closed(generation, "link dropped");
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
