//! Configuration management for Schema Guard
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-guard.toml)
//! - Environment variables (SCHEMA_GUARD__*)
//!
//! ## Example config file (schema-guard.toml):
//! ```toml
//! [storage]
//! backend = "sqlite"
//! path = "./data/schemas.sqlite3"
//! busy_timeout_ms = 5000
//!
//! [validation]
//! apply_mapping_by_default = false
//! max_records = 100000
//!
//! [logging]
//! level = "info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::registry::{SchemaRegistry, DEFAULT_MAX_RECORDS};
use crate::storage::SqliteStorageConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which storage backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file for the sqlite backend
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Apply the latest saved mapping unless a request says otherwise
    #[serde(default)]
    pub apply_mapping_by_default: bool,

    /// Largest batch accepted by a single validation call
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_storage_path() -> PathBuf {
    PathBuf::from("schemas.sqlite3")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            apply_mapping_by_default: false,
            max_records: default_max_records(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an optional explicit file on top
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-guard.toml",
            ".schema-guard.toml",
            "config/schema-guard.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("dev", "familiar", "schema-guard") {
            let xdg_config = dirs.config_dir().join("schema-guard.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_GUARD__STORAGE__PATH=... etc.
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_GUARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Storage path with relative paths resolved against the working directory
    pub fn storage_path(&self) -> PathBuf {
        if self.storage.path.is_absolute() {
            self.storage.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.storage.path)
        }
    }

    /// Build the registry this configuration describes
    pub fn open_registry(&self) -> Result<SchemaRegistry> {
        let registry = match self.storage.backend {
            StorageBackend::Memory => SchemaRegistry::in_memory(),
            StorageBackend::Sqlite => SchemaRegistry::open(&SqliteStorageConfig {
                path: self.storage_path(),
                busy_timeout_ms: self.storage.busy_timeout_ms,
            })?,
        };
        Ok(registry.with_max_records(self.validation.max_records))
    }
}
