//! Engine configuration and its JSON file IO.
//!
//! ```json
//! {
//!   "groupTimeoutMs": 2000,
//!   "maxConcurrentGroups": 4,
//!   "dedupeKeys": true,
//!   "collisionPolicy": "last_wins"
//! }
//! ```

use std::{
    env,
    fs::{self, create_dir_all, write},
    path::{Path, PathBuf},
    time::Duration,
};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use viewforge_util::expand_tilde;

use crate::FillerOptions;

/// Which result is kept when a bulk fetch returns several for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    LastWins,
    FirstWins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineConfig {
    pub group_timeout_ms: Option<u64>,
    pub max_concurrent_groups: usize,
    pub dedupe_keys: bool,
    pub collision_policy: CollisionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_timeout_ms: None,
            max_concurrent_groups: 8,
            dedupe_keys: true,
            collision_policy: CollisionPolicy::LastWins,
        }
    }
}

impl EngineConfig {
    pub fn group_timeout(&self) -> Option<Duration> {
        self.group_timeout_ms.map(Duration::from_millis)
    }
}

impl From<&EngineConfig> for FillerOptions {
    fn from(config: &EngineConfig) -> Self {
        FillerOptions {
            group_timeout: config.group_timeout(),
            max_concurrent_groups: config.max_concurrent_groups,
            dedupe_keys: config.dedupe_keys,
            collision_policy: config.collision_policy,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("maxConcurrentGroups must be at least 1")]
    NoConcurrency,

    #[error("groupTimeoutMs must be greater than 0 when set")]
    ZeroTimeout,
}

pub fn validate_config(config: &EngineConfig) -> Result<(), ValidationError> {
    if config.max_concurrent_groups == 0 {
        return Err(ValidationError::NoConcurrency);
    }
    if config.group_timeout_ms == Some(0) {
        return Err(ValidationError::ZeroTimeout);
    }
    Ok(())
}

/// Returns the default path for the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var("VIEWFORGE_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("viewforge")
        .join("engine.json")
}

/// Loads configuration from the default path.
pub fn load_config() -> anyhow::Result<EngineConfig> {
    load_config_from_path(&default_config_path())
}

/// Loads configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no engine config found; using defaults");
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_config_to_path(config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    validate_config(config)?;
    if let Some(parent_directory) = path.parent() {
        create_dir_all(parent_directory)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    write(path, content)?;
    Ok(())
}
