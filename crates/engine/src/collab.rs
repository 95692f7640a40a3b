// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator seams: account registry, config provider, and event sinks

use async_trait::async_trait;
use fh_adapters::ConfigSource;
use fh_core::{Account, BreakerError, CircuitBreaker, Clock, ConfigSnapshot, LogEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Source of known accounts, consulted when starting every account
pub trait AccountRegistry: Send + Sync + 'static {
    fn list_accounts(&self) -> Vec<Account>;

    fn get(&self, account_id: &str) -> Option<Account> {
        self.list_accounts().into_iter().find(|a| a.id == account_id)
    }
}

/// Builds the configuration snapshot pushed to a unit
#[async_trait]
pub trait ConfigProvider: Send + Sync + 'static {
    async fn snapshot(&self, account: &Account) -> ConfigSnapshot;
}

/// Fire-and-forget callbacks for the admin layer
pub trait RuntimeSink: Send + Sync + 'static {
    fn on_status(&self, _account_id: &str, _account_name: &str, _status: &serde_json::Value) {}

    fn on_log(&self, _entry: &LogEntry) {}

    fn on_account_log(&self, _entry: &LogEntry) {}
}

/// In-memory account list
#[derive(Default)]
pub struct StaticAccounts {
    accounts: RwLock<Vec<Account>>,
}

impl StaticAccounts {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Insert or replace by id
    pub fn upsert(&self, account: Account) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
    }

    pub fn remove(&self, account_id: &str) -> bool {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let before = accounts.len();
        accounts.retain(|a| a.id != account_id);
        accounts.len() != before
    }
}

impl AccountRegistry for StaticAccounts {
    fn list_accounts(&self) -> Vec<Account> {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Per-account revision counter. The revision moves only when the content
/// differs from the last snapshot handed out.
#[derive(Default)]
struct Revisions {
    last: Mutex<HashMap<String, (u64, serde_json::Value)>>,
}

impl Revisions {
    fn stamp(&self, account_id: &str, data: serde_json::Value) -> ConfigSnapshot {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let revision = match last.get(account_id) {
            Some((revision, previous)) if *previous == data => *revision,
            Some((revision, _)) => revision + 1,
            None => 1,
        };
        last.insert(account_id.to_string(), (revision, data.clone()));
        ConfigSnapshot::new(account_id, revision, data)
    }
}

/// Serves each account's inline configuration
#[derive(Default)]
pub struct StaticConfigProvider {
    revisions: Revisions,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn snapshot(&self, account: &Account) -> ConfigSnapshot {
        self.revisions.stamp(&account.id, account.config.clone())
    }
}

/// Reads configuration from a remote source behind a circuit breaker.
///
/// While the breaker is open, or when a fetch fails, the last configuration
/// fetched for the account is served, falling back to the account's inline
/// configuration. The remote source's errors never reach the caller.
pub struct GuardedConfigProvider<S, C: Clock> {
    source: S,
    breaker: Arc<CircuitBreaker<C>>,
    last_known: Mutex<HashMap<String, serde_json::Value>>,
    revisions: Revisions,
}

impl<S: ConfigSource, C: Clock> GuardedConfigProvider<S, C> {
    pub fn new(source: S, breaker: Arc<CircuitBreaker<C>>) -> Self {
        Self {
            source,
            breaker,
            last_known: Mutex::new(HashMap::new()),
            revisions: Revisions::default(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    fn fallback(&self, account: &Account) -> serde_json::Value {
        self.last_known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&account.id)
            .cloned()
            .unwrap_or_else(|| account.config.clone())
    }
}

#[async_trait]
impl<S: ConfigSource, C: Clock> ConfigProvider for GuardedConfigProvider<S, C> {
    async fn snapshot(&self, account: &Account) -> ConfigSnapshot {
        let data = match self.breaker.call(|| self.source.fetch(&account.id)).await {
            Ok(Some(data)) => {
                self.last_known
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(account.id.clone(), data.clone());
                data
            }
            Ok(None) => self.fallback(account),
            Err(BreakerError::Open { name }) => {
                tracing::debug!(account_id = %account.id, breaker = %name, "config source unavailable, using fallback");
                self.fallback(account)
            }
            Err(BreakerError::Inner(e)) => {
                tracing::warn!(account_id = %account.id, error = %e, "config fetch failed, using fallback");
                self.fallback(account)
            }
        };
        self.revisions.stamp(&account.id, data)
    }
}

#[cfg(test)]
#[path = "collab_tests.rs"]
mod tests;
