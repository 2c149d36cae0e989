//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use nt_core::{Capabilities, DaysBackLimits};
use serde::{Deserialize, Serialize};

const DEFAULT_SOURCE_URL: &str = "https://fddb.info";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Diary source site and its credentials.
    pub source: SourceConfig,
    /// Bounds for `export days`.
    pub export: ExportConfig,
    pub storage: StorageConfig,
    /// Optional time-series sink.
    pub influx: InfluxConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExportConfig {
    pub min_days: u32,
    pub max_days: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Keep diary entries in the local database.
    pub document_store: bool,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub enabled: bool,
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("source", &self.source)
            .field("export", &self.export)
            .field("storage", &self.storage)
            .field("influx", &self.influx)
            .finish()
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("nt.db"),
            source: SourceConfig::default(),
            export: ExportConfig::default(),
            storage: StorageConfig::default(),
            influx: InfluxConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_URL.to_string(),
            username: None,
            password: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        let limits = DaysBackLimits::default();
        Self {
            min_days: limits.min_days,
            max_days: limits.max_days,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document_store: true,
        }
    }
}

impl ExportConfig {
    pub const fn limits(&self) -> DaysBackLimits {
        DaysBackLimits {
            min_days: self.min_days,
            max_days: self.max_days,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // NT_SOURCE__USERNAME -> source.username
        figment = figment.merge(Env::prefixed("NT_").split("__"));

        figment.extract()
    }

    /// Storage backends switched on by this configuration.
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            document_store: self.storage.document_store,
            time_series: self.influx.enabled,
        }
    }
}

/// Returns the platform-specific config directory for nt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nt"))
}

/// Returns the platform-specific data directory for nt.
///
/// On Linux: `~/.local/share/nt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("nt"))
}
