// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake config source for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ConfigSource, SourceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    configs: HashMap<String, serde_json::Value>,
    down: bool,
    fetches: Vec<String>,
}

/// In-memory config source that can be switched down to simulate an outage
#[derive(Clone, Default)]
pub struct FakeConfigSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, account_id: &str, config: serde_json::Value) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .configs
            .insert(account_id.to_string(), config);
    }

    pub fn set_down(&self, down: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).down = down;
    }

    /// Account ids of every fetch attempt, in order
    pub fn fetches(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fetches
            .clone()
    }
}

#[async_trait]
impl ConfigSource for FakeConfigSource {
    async fn fetch(&self, account_id: &str) -> Result<Option<serde_json::Value>, SourceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fetches.push(account_id.to_string());
        if state.down {
            return Err(SourceError::Unavailable("fake outage".to_string()));
        }
        Ok(state.configs.get(account_id).cloned())
    }
}
