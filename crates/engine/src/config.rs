//! Engine tuning knobs, loadable from YAML.

use econ::DEFAULT_OFFLINE_CAP_SECS;
use persistence::DEFAULT_SAVE_KEY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Delay between the first change in a window and the save it triggers.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 2_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid engine config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine configuration. Every field has a default, so an empty file is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store key the snapshot lives under.
    pub save_key: String,
    /// Debounce window for saves, in milliseconds.
    pub save_debounce_ms: u64,
    /// Maximum offline production credited on load, in seconds.
    pub offline_cap_secs: u32,
    /// Seed for critical rolls; OS entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            save_key: DEFAULT_SAVE_KEY.to_string(),
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            offline_cap_secs: DEFAULT_OFFLINE_CAP_SECS,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}
