// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-lane outbound rate limiter
//!
//! Every send is a [`SendTask`] queued on the urgent or normal lane. A single
//! drain loop runs one task at a time and keeps at least `min_interval`
//! between consecutive tasks, whichever lane they came from.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Deferred send. Runs at most once; dropping it unsent is how queued work
/// is discarded.
pub type SendTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    /// Urgent sends allowed back to back while normal work waits
    pub max_consecutive_urgent: u32,
    /// Queue depth at which each drain iteration warns
    pub depth_warn_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(334),
            max_consecutive_urgent: 1,
            depth_warn_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Urgent,
    Normal,
}

/// The two FIFO lanes and the urgent streak counter
#[derive(Debug)]
pub struct Lanes<T> {
    urgent: VecDeque<T>,
    normal: VecDeque<T>,
    urgent_streak: u32,
}

impl<T> Default for Lanes<T> {
    fn default() -> Self {
        Self {
            urgent: VecDeque::new(),
            normal: VecDeque::new(),
            urgent_streak: 0,
        }
    }
}

impl<T> Lanes<T> {
    pub fn push(&mut self, lane: Lane, item: T) {
        match lane {
            Lane::Urgent => self.urgent.push_back(item),
            Lane::Normal => self.normal.push_back(item),
        }
    }

    /// Next item to send.
    ///
    /// Urgent goes first, unless `max_urgent` urgent items already went in a
    /// row and normal work is waiting; then one normal item is forced through
    /// and the streak resets. Any normal send resets the streak.
    pub fn pick(&mut self, max_urgent: u32) -> Option<(Lane, T)> {
        let max_urgent = max_urgent.max(1);
        if !self.urgent.is_empty() {
            if self.urgent_streak >= max_urgent && !self.normal.is_empty() {
                self.urgent_streak = 0;
                return self.normal.pop_front().map(|t| (Lane::Normal, t));
            }
            self.urgent_streak += 1;
            return self.urgent.pop_front().map(|t| (Lane::Urgent, t));
        }
        self.urgent_streak = 0;
        self.normal.pop_front().map(|t| (Lane::Normal, t))
    }

    /// (urgent, normal)
    pub fn depth(&self) -> (usize, usize) {
        (self.urgent.len(), self.normal.len())
    }

    pub fn is_empty(&self) -> bool {
        self.urgent.is_empty() && self.normal.is_empty()
    }
}

struct LimiterState {
    lanes: Lanes<SendTask>,
    draining: bool,
    last_send: Option<Instant>,
    sent: u64,
}

struct LimiterInner {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl LimiterInner {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle to one connection's send queues.
///
/// Enqueueing must happen inside a Tokio runtime; the drain loop is spawned
/// on demand and exits when both lanes are empty.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                config,
                state: Mutex::new(LimiterState {
                    lanes: Lanes::default(),
                    draining: false,
                    last_send: None,
                    sent: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    pub fn enqueue(&self, task: SendTask) {
        self.push(Lane::Normal, task);
    }

    pub fn enqueue_urgent(&self, task: SendTask) {
        self.push(Lane::Urgent, task);
    }

    fn push(&self, lane: Lane, task: SendTask) {
        let mut state = self.inner.lock();
        state.lanes.push(lane, task);
        if !state.draining {
            state.draining = true;
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Drop every queued task unsent, returning how many were dropped
    pub fn clear(&self) -> usize {
        // Taken out first so the tasks, which may own result channels, are
        // dropped after the lock is released.
        let discarded = std::mem::take(&mut self.inner.lock().lanes);
        let (urgent, normal) = discarded.depth();
        urgent + normal
    }

    /// (urgent, normal)
    pub fn depth(&self) -> (usize, usize) {
        self.inner.lock().lanes.depth()
    }

    pub fn sent(&self) -> u64 {
        self.inner.lock().sent
    }
}

async fn drain(inner: Arc<LimiterInner>) {
    let config = &inner.config;
    loop {
        let wait_until = {
            let mut state = inner.lock();
            if state.lanes.is_empty() {
                state.draining = false;
                return;
            }
            let (urgent, normal) = state.lanes.depth();
            if urgent + normal >= config.depth_warn_threshold {
                tracing::warn!(
                    depth = urgent + normal,
                    urgent,
                    "send queue backing up, requests may be delayed"
                );
            }
            state.last_send.map(|at| at + config.min_interval)
        };

        if let Some(at) = wait_until.filter(|at| *at > Instant::now()) {
            tokio::time::sleep_until(at).await;
        }

        let task = {
            let mut state = inner.lock();
            match state.lanes.pick(config.max_consecutive_urgent) {
                Some((_, task)) => {
                    state.last_send = Some(Instant::now());
                    state.sent += 1;
                    task
                }
                None => {
                    state.draining = false;
                    return;
                }
            }
        };
        task();
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
