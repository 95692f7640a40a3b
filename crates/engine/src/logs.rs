// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory log buffers for the admin layer

use crate::collab::RuntimeSink;
use fh_core::{LogEntry, LogLevel};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const GLOBAL_LOG_CAPACITY: usize = 1000;
pub const ACCOUNT_LOG_CAPACITY: usize = 300;

/// Which entries to return
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub account_id: Option<String>,
    /// Minimum level
    pub level: Option<LogLevel>,
    /// Case-insensitive match against tag and message
    pub keyword: Option<String>,
    /// Newest N entries, still returned oldest first
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }

    fn matches(&self, entry: &LogEntry, keyword: Option<&str>) -> bool {
        if let Some(id) = &self.account_id {
            if entry.account_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if self.level.is_some_and(|min| entry.level < min) {
            return false;
        }
        match keyword {
            Some(k) => {
                entry.message.to_lowercase().contains(k) || entry.tag.to_lowercase().contains(k)
            }
            None => true,
        }
    }
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let keyword = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);
        let mut matched: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| filter.matches(e, keyword.as_deref()))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

/// Global and account log buffers; oldest entries are evicted first
pub struct LogStore {
    global: Mutex<Ring>,
    account: Mutex<Ring>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::with_capacity(GLOBAL_LOG_CAPACITY, ACCOUNT_LOG_CAPACITY)
    }
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(global: usize, account: usize) -> Self {
        Self {
            global: Mutex::new(Ring::new(global.max(1))),
            account: Mutex::new(Ring::new(account.max(1))),
        }
    }

    pub fn push_global(&self, entry: LogEntry) {
        self.global
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn push_account(&self, entry: LogEntry) {
        self.account
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn global(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.global
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .query(filter)
    }

    pub fn account(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.account
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .query(filter)
    }
}

impl RuntimeSink for LogStore {
    fn on_log(&self, entry: &LogEntry) {
        self.push_global(entry.clone());
    }

    fn on_account_log(&self, entry: &LogEntry) {
        self.push_account(entry.clone());
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
