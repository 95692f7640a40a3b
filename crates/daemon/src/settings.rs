// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon settings, read from one TOML file.
//!
//! Every section is optional. Durations are humantime strings (`"334ms"`,
//! `"30s"`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fh_adapters::{HttpSourceConfig, UnitKind, WebhookConfig};
use fh_core::{Account, BreakerConfig};
use fh_engine::OrchestratorConfig;
use fh_transport::{GatewayConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File read when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "fieldhand.toml";

/// Environment variable naming the settings file
pub const SETTINGS_ENV: &str = "FIELDHAND_CONFIG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Thread or process units
    pub mode: UnitKind,
    /// Overrides the platform state directory
    pub state_dir: Option<PathBuf>,
    /// Start every account when the daemon comes up
    pub autostart: bool,
    pub transport: TransportConfig,
    pub gateway: GatewayConfig,
    pub breaker: BreakerConfig,
    pub orchestrator: OrchestratorSettings,
    pub notify: Option<WebhookConfig>,
    pub config_source: Option<HttpSourceConfig>,
    pub jobs: JobSettings,
    pub accounts: Vec<Account>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: UnitKind::default(),
            state_dir: None,
            autostart: true,
            transport: TransportConfig::default(),
            gateway: GatewayConfig::default(),
            breaker: BreakerConfig::default(),
            orchestrator: OrchestratorSettings::default(),
            notify: None,
            config_source: None,
            jobs: JobSettings::default(),
            accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    #[serde(flatten)]
    pub engine: OrchestratorConfig,
    /// How long a process unit may take to exit after a stop
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,
    /// Period of each unit's status report
    #[serde(with = "humantime_serde")]
    pub status_interval: Duration,
    /// End a unit when its login is rejected
    pub exit_on_halt: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            engine: OrchestratorConfig::default(),
            stop_grace: Duration::from_secs(5),
            status_interval: Duration::from_secs(5),
            exit_on_halt: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    #[serde(with = "humantime_serde")]
    pub fleet_summary: Duration,
    /// Periodic config push to every unit; off when unset
    #[serde(with = "humantime_serde")]
    pub config_refresh: Option<Duration>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            fleet_summary: Duration::from_secs(60),
            config_refresh: None,
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Resolve the settings file and load it.
    ///
    /// An explicit path (argument or `FIELDHAND_CONFIG`) must exist. Without
    /// one, `fieldhand.toml` in the working directory is used if present and
    /// defaults otherwise. Returns the path that was read, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), SettingsError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from));
        if let Some(path) = explicit {
            return Ok((Self::load(&path)?, Some(path)));
        }
        let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
        if fallback.exists() {
            return Ok((Self::load(&fallback)?, Some(fallback)));
        }
        Ok((Self::default(), None))
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.id.trim().is_empty() {
                return Err(SettingsError::Invalid("account with empty id".to_string()));
            }
            if !seen.insert(account.id.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate account id: {}",
                    account.id
                )));
            }
        }
        if self.breaker.failure_threshold == 0 {
            return Err(SettingsError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.breaker.half_open_probes == 0 {
            return Err(SettingsError::Invalid(
                "breaker.half_open_probes must be at least 1".to_string(),
            ));
        }
        if self.transport.rate.max_consecutive_urgent == 0 {
            return Err(SettingsError::Invalid(
                "transport.max_consecutive_urgent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
