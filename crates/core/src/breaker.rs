// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-state circuit breaker guarding one unreliable dependency
//!
//! Closed passes everything through. After `failure_threshold` consecutive
//! failures the breaker opens and fails fast until `cooldown` has elapsed,
//! then lets `half_open_probes` calls through to test recovery.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_probes: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Operator-facing view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub half_open_trials_issued: u32,
    pub opened_at_ms: Option<u64>,
    pub last_success_at_ms: Option<u64>,
    pub last_failure_at_ms: Option<u64>,
    /// Time left before the next trial call is allowed, while open
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit '{name}' is open")]
    Open { name: String },
    #[error("{0}")]
    Inner(E),
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_ms: Option<u64>,
    last_success_at_ms: Option<u64>,
    last_failure_at_ms: Option<u64>,
    trials_issued: u32,
}

pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: BreakerConfig,
    clock: C,
    inner: Mutex<Inner>,
}

impl CircuitBreaker<SystemClock> {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// A trial budget of zero would leave the breaker half-open forever, so
    /// it is raised to one.
    pub fn with_clock(name: impl Into<String>, config: BreakerConfig, clock: C) -> Self {
        let config = BreakerConfig {
            half_open_probes: config.half_open_probes.max(1),
            ..config
        };
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_ms: None,
                last_success_at_ms: None,
                last_failure_at_ms: None,
                trials_issued: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether a call may be attempted now.
    ///
    /// The call that moves an expired open breaker to half-open is the
    /// first trial call of that window. Every `true` must be followed by exactly
    /// one `record_success` or `record_failure`.
    pub fn is_available(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| self.clock.now().duration_since(at) >= self.config.cooldown);
                if !cooled {
                    return false;
                }
                inner.state = BreakerState::HalfOpen;
                inner.trials_issued = 1;
                tracing::info!(breaker = %self.name, "circuit half-open, allowing a trial call");
                true
            }
            BreakerState::HalfOpen => {
                if inner.trials_issued < self.config.half_open_probes {
                    inner.trials_issued += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.last_success_at_ms = Some(self.clock.epoch_ms());
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, from = ?inner.state, "circuit closed");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.opened_at_ms = None;
            inner.trials_issued = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at_ms = Some(self.clock.epoch_ms());
        match inner.state {
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "trial call failed, circuit re-opened");
                self.open(&mut inner);
            }
            BreakerState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.consecutive_failures,
                    cooldown_ms = self.cooldown_ms(),
                    "circuit opened"
                );
                self.open(&mut inner);
            }
            _ => {}
        }
    }

    /// Operator override: force closed and clear every counter
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.opened_at_ms = None;
        inner.last_success_at_ms = None;
        inner.last_failure_at_ms = None;
        inner.trials_issued = 0;
        tracing::info!(breaker = %self.name, "circuit reset");
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(at)) => {
                let elapsed = self.clock.now().duration_since(at);
                Some(millis(self.config.cooldown.saturating_sub(elapsed)))
            }
            _ => None,
        };
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            cooldown_ms: self.cooldown_ms(),
            half_open_trials_issued: inner.trials_issued,
            opened_at_ms: inner.opened_at_ms,
            last_success_at_ms: inner.last_success_at_ms,
            last_failure_at_ms: inner.last_failure_at_ms,
            retry_in_ms,
        }
    }

    /// Check availability, run `op`, and record its outcome
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_available() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(self.clock.now());
        inner.opened_at_ms = Some(self.clock.epoch_ms());
        inner.trials_issued = 0;
    }

    fn cooldown_ms(&self) -> u64 {
        millis(self.config.cooldown)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
