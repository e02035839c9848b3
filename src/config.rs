//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::index::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::seqid::MAX_WORKER_ID;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("seqidx").join("seqidx.db"))
        .unwrap_or_else(|| PathBuf::from("./seqidx.db"))
}

/// Replace a leading `~` with the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// SeqId generation and scan defaults
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    /// Worker id embedded in every SeqId (0-1023, unique per writer)
    #[serde(default)]
    pub worker_id: u16,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            worker_id: 0,
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.store.path = expand_home(&config.store.path);

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("seqidx").join("config.toml")),
            Some(PathBuf::from("./seqidx.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.worker_id > MAX_WORKER_ID {
            return Err(ConfigError::Invalid(format!(
                "index.worker_id must be at most {}, got {}",
                MAX_WORKER_ID, self.index.worker_id
            )));
        }
        if self.index.page_size == 0 || self.index.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "index.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.index.page_size
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SEQIDX_*` overrides read through `var`
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(path) = var("SEQIDX_DB_PATH") {
            self.store.path = expand_home(Path::new(&path));
        }

        // Index overrides
        if let Some(worker_id) = var("SEQIDX_WORKER_ID") {
            match worker_id.parse() {
                Ok(id) => self.index.worker_id = id,
                Err(_) => tracing::warn!("Ignoring invalid SEQIDX_WORKER_ID {:?}", worker_id),
            }
        }
        if let Some(page_size) = var("SEQIDX_PAGE_SIZE") {
            match page_size.parse() {
                Ok(size) => self.index.page_size = size,
                Err(_) => tracing::warn!("Ignoring invalid SEQIDX_PAGE_SIZE {:?}", page_size),
            }
        }

        // Logging overrides
        if let Some(level) = var("SEQIDX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SEQIDX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# seqidx Configuration
#
# Environment variables override these settings:
# - SEQIDX_DB_PATH
# - SEQIDX_WORKER_ID
# - SEQIDX_PAGE_SIZE
# - SEQIDX_LOG_LEVEL
# - SEQIDX_LOG_FORMAT

[store]
# SQLite database file
path = "~/.local/share/seqidx/seqidx.db"

[index]
# Worker id embedded in generated SeqIds (0-1023)
# Every process writing to the same database needs its own id
worker_id = 0

# Rows fetched per index query during a scan
page_size = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.worker_id, 0);
        assert_eq!(config.index.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.logging.level, "info");
        assert!(config.store.path.ends_with("seqidx.db"));
    }

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.index.page_size, 10_000);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seqidx.toml");
        std::fs::write(&path, "[index]\nworker_id = 17\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.index.worker_id, 17);
        assert_eq!(config.index.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[index\nworker_id = ").unwrap();
        assert!(matches!(Config::load(&broken), Err(ConfigError::Parse { .. })));

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[index]\nworker_id = 4096\n").unwrap();
        assert!(matches!(Config::load(&invalid), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SEQIDX_DB_PATH", "/tmp/other.db"),
            ("SEQIDX_WORKER_ID", "12"),
            ("SEQIDX_PAGE_SIZE", "not a number"),
            ("SEQIDX_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.index.worker_id, 12);
        assert_eq!(config.index.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_home_relative_db_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seqidx.toml");
        std::fs::write(&path, generate_default_config()).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.store.path.starts_with("~"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                config.store.path,
                home.join(".local/share/seqidx/seqidx.db")
            );
        }

        let mut config = Config::default();
        config.apply_overrides(|key| (key == "SEQIDX_DB_PATH").then(|| "~/x.db".to_string()));
        assert!(!config.store.path.starts_with("~") || dirs::home_dir().is_none());

        // Only a whole leading component is expanded
        assert_eq!(expand_home(Path::new("~x/y.db")), PathBuf::from("~x/y.db"));
    }
}
