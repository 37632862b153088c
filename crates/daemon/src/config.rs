// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration file
//!
//! ```toml
//! [daemon]
//! socket_path = "/tmp/rungate/rungated.sock"
//! state_dir = "/var/lib/rungate"
//!
//! [defaults]
//! capacity = 1
//! follower_grant_timeout = "10m"
//!
//! [[runner]]
//! id = "emulator-a"
//! capacity = 2
//! ```

use rungate_core::config::{DEFAULT_CHECKPOINT_THRESHOLD, DEFAULT_QUEUE_PREVIEW_LEN};
use rungate_core::{CoordinatorConfig, RunnerId};
use rungate_engine::{RegistryConfig, DEFAULT_FOLLOWER_GRANT_TIMEOUT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file path override
pub const ENV_CONFIG: &str = "RUNGATE_CONFIG";
/// Socket path override
pub const ENV_SOCKET: &str = "RUNGATE_SOCKET";
/// State directory override
pub const ENV_STATE_DIR: &str = "RUNGATE_STATE_DIR";

/// Socket used when neither the file nor the environment names one.
///
/// Kept under /tmp so the path stays short (macOS SUN_LEN = 104).
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/rungate/rungated.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("invalid config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("could not determine state directory")]
    NoStateDir,

    #[error("runner {0} is configured twice")]
    DuplicateRunner(RunnerId),

    #[error("runner id must not be blank")]
    BlankRunner,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    pub socket_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsSection {
    pub capacity: i64,
    pub checkpoint_threshold: u64,
    pub queue_preview_len: usize,
    #[serde(with = "humantime_serde")]
    pub follower_grant_timeout: Duration,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            capacity: 1,
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            queue_preview_len: DEFAULT_QUEUE_PREVIEW_LEN,
            follower_grant_timeout: DEFAULT_FOLLOWER_GRANT_TIMEOUT,
        }
    }
}

/// Per-runner overrides; unset fields fall back to `[defaults]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    pub id: RunnerId,
    pub capacity: Option<i64>,
    pub checkpoint_threshold: Option<u64>,
}

/// Parsed `rungated.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub daemon: DaemonSection,
    pub defaults: DefaultsSection,
    pub runner: Vec<RunnerSection>,
}

impl DaemonConfig {
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from `RUNGATE_CONFIG`, or use defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Read(path.clone(), e))?;
                Self::parse(&path, &content)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(socket) = std::env::var_os(ENV_SOCKET) {
            self.daemon.socket_path = Some(PathBuf::from(socket));
        }
        if let Some(state_dir) = std::env::var_os(ENV_STATE_DIR) {
            self.daemon.state_dir = Some(PathBuf::from(state_dir));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for runner in &self.runner {
            if runner.id.is_blank() {
                return Err(ConfigError::BlankRunner);
            }
            if !seen.insert(&runner.id) {
                return Err(ConfigError::DuplicateRunner(runner.id.clone()));
            }
        }
        Ok(())
    }

    pub fn socket_path(&self) -> PathBuf {
        self.daemon
            .socket_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
    }

    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.daemon.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_state_dir(),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.daemon.log_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.state_dir()?.join("rungated.log")),
        }
    }

    pub fn coordinator_defaults(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::with_capacity(self.defaults.capacity)
            .with_checkpoint_threshold(self.defaults.checkpoint_threshold);
        config.queue_preview_len = self.defaults.queue_preview_len;
        config
    }

    /// Registry settings rooted at the state directory
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let defaults = self.coordinator_defaults();
        let mut registry = RegistryConfig::new(self.state_dir()?)
            .with_defaults(defaults.clone())
            .with_follower_grant_timeout(self.defaults.follower_grant_timeout);
        for runner in &self.runner {
            let mut config = defaults.clone();
            if let Some(capacity) = runner.capacity {
                config.capacity = capacity;
            }
            if let Some(threshold) = runner.checkpoint_threshold {
                config.checkpoint_threshold = threshold;
            }
            registry = registry.with_runner(runner.id.clone(), config);
        }
        Ok(registry)
    }
}

/// `$XDG_STATE_HOME/rungate`, else `~/.local/state/rungate`
fn default_state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("rungate"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/rungate"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
