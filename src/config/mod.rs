//! Configuration module for budgetsync.
//!
//! Handles the config file, environment variables, and settings.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, ExportSettings, Settings, SettingsError, SourceSettings,
};
