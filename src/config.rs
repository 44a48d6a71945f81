//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path passed to [`Config::load`]
//! 2. `$MIMIR_CONFIG`
//! 3. `~/.mimir/config.toml` (user)
//! 4. `/etc/mimir/config.toml` (system)
//!
//! ```toml
//! [store]
//! max_entries = 50000
//! default_ttl_secs = 600
//!
//! [versions]
//! Post = "v3"
//! Comment = "2024-06-01"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::metadata::VersionTags;
use crate::store::StoreConfig;
use crate::{MimirError, Result};

/// Environment variable naming a config file.
const CONFIG_ENV_VAR: &str = "MIMIR_CONFIG";

/// Mimir configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    /// Scope name → version tag.
    #[serde(default)]
    pub versions: HashMap<String, String>,
}

/// In-memory store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Maximum cached entries (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Fallback entry TTL in seconds; unset means no expiry.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_secs: None,
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| MimirError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store.max_entries == 0 {
            return Err(MimirError::Configuration(
                "store.max_entries must be greater than zero".to_string(),
            ));
        }
        if let Some(scope) = self.versions.keys().find(|s| s.trim().is_empty()) {
            return Err(MimirError::Configuration(format!(
                "invalid scope name in [versions]: {scope:?}"
            )));
        }
        Ok(())
    }

    /// Settings for [`MemoryStore`](crate::MemoryStore).
    pub fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new().max_entries(self.store.max_entries);
        match self.store.default_ttl_secs {
            Some(secs) => config.ttl(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// Version tags declared under `[versions]`.
    pub fn version_tags(&self) -> VersionTags {
        self.versions
            .iter()
            .map(|(scope, version)| (scope.clone(), version.clone()))
            .collect()
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            return Err(MimirError::Configuration(format!(
                "Config file from {CONFIG_ENV_VAR} not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MimirError::Configuration(
            "No config file found. Create ~/.mimir/config.toml or /etc/mimir/config.toml"
                .to_string(),
        ))
    }
}
