//! Host configuration, read from a TOML file such as `plinth.toml`:
//!
//! ```toml
//! [events.thresholds]
//! "server.started" = 2
//!
//! [pool]
//! growth = 5
//!
//! [permissions]
//! defaults = ["chat.color", "home.set"]
//! ```

use crate::error::Result;
use plinth_events::{BusConfig, DEFAULT_GROWTH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub events: BusConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Capacity added each time a pool fills up.
    #[serde(default = "default_growth")]
    pub growth: usize,
}

fn default_growth() -> usize {
    DEFAULT_GROWTH
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            growth: default_growth(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Permissions the default handler allows for everyone.
    #[serde(default)]
    pub defaults: Vec<String>,
}

impl HostConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads configuration from `path`.
    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No host config found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded host config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse host config {:?}: {}. Falling back to defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read host config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}
