use anyhow::{Context, Result};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// Complete lamp-control configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LampConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which store backs the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Repository configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file (sqlite backend only)
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Deadline for a single durable-store operation
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_database_path() -> String {
    "lamps.db".to_string()
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl LampConfig {
    /// Apply `LAMP_*` environment overrides on top of file/default values.
    ///
    /// Setting `LAMP_DATABASE_PATH` alone switches to the sqlite backend;
    /// `LAMP_STORAGE_BACKEND` always wins when both are present.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LAMP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("LAMP_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => warn!(value = %v, error = %e, "Ignoring invalid LAMP_PORT"),
            }
        }
        if let Some(v) = lookup("LAMP_DATABASE_PATH") {
            self.storage.database_path = v;
            self.storage.backend = StorageBackend::Sqlite;
        }
        if let Some(v) = lookup("LAMP_STORAGE_BACKEND") {
            match v.parse::<StorageBackend>() {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => warn!(value = %v, error = %e, "Ignoring invalid LAMP_STORAGE_BACKEND"),
            }
        }
        if let Some(v) = lookup("LAMP_QUERY_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) if ms > 0 => self.storage.query_timeout_ms = ms,
                _ => warn!(value = %v, "Ignoring invalid LAMP_QUERY_TIMEOUT_MS"),
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<LampConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: LampConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
