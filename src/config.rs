//! Configuration module for the state sync engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SITESYNC_` and use double
//! underscores to separate nested levels:
//! - `SITESYNC_SYNC__DEBOUNCE_SECS=60` sets `sync.debounce_secs`
//! - `SITESYNC_SYNC__MULTISITE=true` sets `sync.multisite`
//! - `SITESYNC_DEBUG=true` sets `debug`

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the persisted state file (options, transients, checksums)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Sync pass configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Debounce window between ordinary sync passes, in seconds
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Whether this is a multisite install (adds network callables)
    #[serde(default = "default_false")]
    pub multisite: bool,

    /// Actor to switch to for producers that require elevation
    #[serde(default = "default_elevated_actor")]
    pub elevated_actor: String,
}

impl SyncConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `tracker = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".sitesync/state.json")
}
fn default_false() -> bool {
    false
}
fn default_debounce_secs() -> u64 {
    300
}
fn default_elevated_actor() -> String {
    "sync-service".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            state_path: default_state_path(),
            debug: false,
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            multisite: false,
            elevated_actor: default_elevated_actor(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".sitesync/settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with SITESYNC_ prefix
            // Double underscore (__) separates nested levels
            .merge(
                Env::prefixed("SITESYNC_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find the workspace config by looking for a .sitesync directory,
    /// searching from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".sitesync");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Write a default settings file, creating the .sitesync directory.
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn init_config_file(force: bool) -> Result<PathBuf, String> {
        let config_dir = PathBuf::from(".sitesync");
        let config_path = config_dir.join("settings.toml");

        if config_path.exists() && !force {
            return Err(format!(
                "Configuration already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        std::fs::create_dir_all(&config_dir)
            .map_err(|e| format!("Failed to create {}: {e}", config_dir.display()))?;

        let toml = toml::to_string_pretty(&Settings::default())
            .map_err(|e| format!("Failed to serialize default settings: {e}"))?;
        std::fs::write(&config_path, toml)
            .map_err(|e| format!("Failed to write {}: {e}", config_path.display()))?;

        Ok(config_path)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        if Self::find_workspace_config().is_none() {
            return Err("No .sitesync directory found. Run `sitesync init` first.".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.sync.debounce_secs, 300);
        assert!(!settings.sync.multisite);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_debounce_window_conversion() {
        let sync = SyncConfig {
            debounce_secs: 60,
            ..Default::default()
        };
        assert_eq!(sync.debounce_window(), Duration::from_secs(60));
    }

    #[test]
    fn test_settings_roundtrip_toml() {
        let settings = Settings::default();
        let serialized = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.sync.debounce_secs, settings.sync.debounce_secs);
        assert_eq!(parsed.state_path, settings.state_path);
    }
}
