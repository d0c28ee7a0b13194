//! TOML-based configuration for budgetsync.
//!
//! Supports a config file (budgetsync.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [cache]
//! path = "${HOME}/.budgetsync/cache.db"
//! in_memory = false
//!
//! [sources]
//! default_ttl_seconds = 3600
//! single_flight = true
//! online = false
//!
//! [sources.ttl_overrides]
//! segments = 900
//!
//! [export]
//! campaign_name_prefix = "bs"
//! activate_campaigns = true
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Snapshot store.
    pub cache: CacheSettings,

    /// Measure source freshness and refresh policy.
    pub sources: SourceSettings,

    /// Campaign export.
    pub export: ExportSettings,
}

/// Cache store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// SQLite file (supports ${ENV_VAR} expansion). Defaults to
    /// `~/.budgetsync/cache.db`.
    pub path: Option<String>,

    /// Keep snapshots in memory only.
    pub in_memory: bool,
}

impl CacheSettings {
    /// Get the cache path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

/// Measure source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// TTL in seconds for sources backed by the delivery network.
    pub default_ttl_seconds: u64,

    /// Serialize refreshes per source name.
    pub single_flight: bool,

    /// Include live inventory sources.
    pub online: bool,

    /// Per-source TTL in seconds, keyed by source id.
    pub ttl_overrides: HashMap<String, u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            single_flight: true,
            online: false,
            ttl_overrides: HashMap::new(),
        }
    }
}

impl SourceSettings {
    pub fn default_ttl(&self) -> Duration {
        seconds(self.default_ttl_seconds)
    }

    /// TTL of one source.
    pub fn ttl_for(&self, source_id: &str) -> Duration {
        self.ttl_overrides
            .get(source_id)
            .map(|s| seconds(*s))
            .unwrap_or_else(|| self.default_ttl())
    }
}

/// Upper bound for any configured TTL: one hundred years.
const MAX_TTL_SECONDS: i64 = 100 * 365 * 24 * 3600;

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(MAX_TTL_SECONDS).min(MAX_TTL_SECONDS))
}

/// Campaign export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Campaign names are `{prefix}-{allocation_id}`.
    pub campaign_name_prefix: String,

    /// Create campaigns in the active state.
    pub activate_campaigns: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            campaign_name_prefix: "bs".to_string(),
            activate_campaigns: true,
        }
    }
}

impl ExportSettings {
    pub fn campaign_name(&self, allocation_id: &str) -> String {
        format!("{}-{}", self.campaign_name_prefix, allocation_id)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `BUDGETSYNC_CONFIG`
    /// 2. `./budgetsync.toml`
    /// 3. `~/.config/budgetsync/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        // Check environment variable first
        if let Ok(path) = env::var("BUDGETSYNC_CONFIG") {
            return Self::from_file(&path);
        }

        // Check local directory
        let local_config = PathBuf::from("budgetsync.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("budgetsync").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sources.default_ttl_seconds == 0 {
            return Err(SettingsError::InvalidConfig(
                "sources.default_ttl_seconds must be positive".to_string(),
            ));
        }
        if let Some((name, _)) = self.sources.ttl_overrides.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(SettingsError::InvalidConfig(format!(
                "sources.ttl_overrides.{} must be positive",
                name
            )));
        }
        if self.export.campaign_name_prefix.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "export.campaign_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            let name: String = std::iter::from_fn(|| chars.next_if(|&ch| ch != '}')).collect();
            chars.next(); // consume '}'
            name
        } else {
            // $VAR ends at non-alphanumeric/underscore
            let name: String =
                std::iter::from_fn(|| chars.next_if(|&ch| ch.is_alphanumeric() || ch == '_'))
                    .collect();
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
