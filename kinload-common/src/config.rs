//! Configuration loading and database path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the SQLite database file
pub const DATABASE_ENV_VAR: &str = "KINLOAD_DATABASE";

/// Environment variable naming the TOML configuration file
pub const CONFIG_ENV_VAR: &str = "KINLOAD_CONFIG";

/// Contents of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Destination database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Import batch tuning
    #[serde(default)]
    pub import: ImportTuning,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Per-invocation limits and write retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportTuning {
    /// Top-level records processed before control returns to the caller (default: 500)
    #[serde(default = "default_batch_records")]
    pub batch_records: usize,

    /// Wall-clock budget of one invocation in milliseconds (default: 20000)
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,

    /// Attempts for a write that fails transiently (default: 3)
    #[serde(default = "default_write_retry_attempts")]
    pub write_retry_attempts: u32,

    /// Initial backoff between write attempts in milliseconds (default: 10)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_records() -> usize {
    500
}

fn default_time_budget_ms() -> u64 {
    20_000
}

fn default_write_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    10
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ImportTuning {
    fn default() -> Self {
        Self {
            batch_records: default_batch_records(),
            time_budget_ms: default_time_budget_ms(),
            write_retry_attempts: default_write_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration if the file exists, otherwise use defaults
    ///
    /// A file that exists but cannot be parsed is an error, not a silent fallback.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                debug!("No config file at {}, using defaults", p.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.import.batch_records == 0 {
            return Err(Error::Config("import.batch_records must be at least 1".to_string()));
        }
        if self.import.write_retry_attempts == 0 {
            return Err(Error::Config(
                "import.write_retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the configuration file path
///
/// Command line, then `KINLOAD_CONFIG`, then the platform config directory.
/// Returns None when no candidate can be determined.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("kinload").join("config.toml"))
}

/// Resolve the destination database path
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_database_path()
}

/// Get OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/kinload (or /var/lib/kinload for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("kinload").join("kinload.db"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/kinload/kinload.db"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("kinload").join("kinload.db"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/kinload/kinload.db"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("kinload").join("kinload.db"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\kinload\\kinload.db"))
    } else {
        PathBuf::from("./kinload_data/kinload.db")
    }
}
