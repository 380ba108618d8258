//! Configuration system for Vigil.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! All configuration options can be overridden via environment variables:
//! - `VIGIL_DATABASE_TYPE` - Database backend ("sqlite" or "postgres")
//! - `VIGIL_DATABASE_URL` - Database connection URL
//! - `VIGIL_OCSERV_MODE` - Control plane mode ("direct" or "docker")
//! - `VIGIL_OCSERV_CONTAINER` - Container name for docker mode
//! - `VIGIL_OCCTL_BIN` - Path to the occtl binary (direct mode)
//! - `VIGIL_OCPASSWD_BIN` - Path to the ocpasswd binary (direct mode)
//! - `VIGIL_OCSERV_PASSWD_FILE` - ocserv password file used for lock/unlock
//! - `VIGIL_MAX_WORKERS` - Concurrency limit for batch job passes
//! - `VIGIL_STATE_FILE` - Path of the persisted cron state file
//! - `VIGIL_LOGGING_ENABLED` - Enable logging
//! - `VIGIL_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{VigilError, VigilResult};

/// Global configuration singleton.
static CONFIG: OnceLock<VigilConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Control plane (ocserv) configuration
    pub ocserv: OcservConfig,
    /// Background job configuration
    pub jobs: JobsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://vigil.db".to_string(),
            postgres_url: "postgres://localhost/vigil".to_string(),
        }
    }
}

/// Control plane configuration.
///
/// `mode` selects how occtl/ocpasswd commands reach the VPN server:
/// - "direct": the binaries run on this host
/// - "docker": the logically identical commands run inside a container
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcservConfig {
    /// Control plane mode: "direct" or "docker"
    pub mode: String,
    /// Container name (docker mode)
    pub container: String,
    /// Path to the occtl binary (direct mode)
    pub occtl_bin: String,
    /// Path to the ocpasswd binary (direct mode)
    pub ocpasswd_bin: String,
    /// ocserv password file used for lock/unlock
    pub passwd_file: String,
}

impl Default for OcservConfig {
    fn default() -> Self {
        Self {
            mode: "direct".to_string(),
            container: "ocserv".to_string(),
            occtl_bin: "occtl".to_string(),
            ocpasswd_bin: "ocpasswd".to_string(),
            passwd_file: "/etc/ocserv/ocpasswd".to_string(),
        }
    }
}

/// Background job configuration.
///
/// Cron expressions use the 6-field seconds-first format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Cron expression for the daily expiry pass (default: 00:01:00)
    pub expire_cron: String,
    /// Cron expression for the daily inactive-user purge (default: 00:02:00)
    pub purge_cron: String,
    /// Cron expression for monthly reactivation (default: day 1 and 2, 00:01:00)
    pub monthly_cron: String,
    /// Maximum concurrent workers per batch pass
    pub max_workers: usize,
    /// Path of the persisted cron state file
    pub state_file: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            // Every day at 00:01:00
            expire_cron: "0 1 0 * * *".to_string(),
            // Every day at 00:02:00
            purge_cron: "0 2 0 * * *".to_string(),
            // First and second day of each month at 00:01:00
            monthly_cron: "0 1 0 1,2 * *".to_string(),
            max_workers: 10,
            state_file: default_state_file(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Default location of the cron state file, under the platform state
/// directory when one exists.
fn default_state_file() -> String {
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("vigil")
        .join("cron-state.json")
        .to_string_lossy()
        .into_owned()
}

impl VigilConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    fn load() -> VigilResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("database.db_type", "sqlite")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://vigil.db")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/vigil")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("ocserv.mode", "direct")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("ocserv.container", "ocserv")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("ocserv.occtl_bin", "occtl")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("ocserv.ocpasswd_bin", "ocpasswd")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("ocserv.passwd_file", "/etc/ocserv/ocpasswd")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("jobs.expire_cron", "0 1 0 * * *")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("jobs.purge_cron", "0 2 0 * * *")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("jobs.monthly_cron", "0 1 0 1,2 * *")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("jobs.max_workers", 10)
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("jobs.state_file", default_state_file())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("logging.enabled", true)
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("database.db_type", env::var("VIGIL_DATABASE_TYPE").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("VIGIL_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("VIGIL_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("ocserv.mode", env::var("VIGIL_OCSERV_MODE").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("ocserv.container", env::var("VIGIL_OCSERV_CONTAINER").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("ocserv.occtl_bin", env::var("VIGIL_OCCTL_BIN").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("ocserv.ocpasswd_bin", env::var("VIGIL_OCPASSWD_BIN").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option(
                "ocserv.passwd_file",
                env::var("VIGIL_OCSERV_PASSWD_FILE").ok(),
            )
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option(
                "jobs.max_workers",
                env::var("VIGIL_MAX_WORKERS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("jobs.state_file", env::var("VIGIL_STATE_FILE").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("VIGIL_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| VigilError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("VIGIL_LOG_LEVEL").ok())
            .map_err(|e| VigilError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| VigilError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| VigilError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> VigilResult<()> {
        // Validate database type
        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(VigilError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        // Validate control plane mode
        match self.ocserv.mode.as_str() {
            "direct" => {}
            "docker" => {
                if self.ocserv.container.is_empty() {
                    return Err(VigilError::ConfigError(
                        "ocserv.container is required when ocserv.mode is 'docker'".to_string(),
                    ));
                }
            }
            other => {
                return Err(VigilError::ConfigError(format!(
                    "ocserv.mode must be 'direct' or 'docker', got '{other}'"
                )));
            }
        }

        // Validate job config
        if self.jobs.max_workers == 0 {
            return Err(VigilError::ConfigError(
                "jobs.max_workers must be greater than 0".to_string(),
            ));
        }
        if self.jobs.state_file.is_empty() {
            return Err(VigilError::ConfigError(
                "jobs.state_file cannot be empty".to_string(),
            ));
        }

        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(VigilError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> VigilResult<&'static VigilConfig> {
    // Check if already initialized
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    // Load and validate configuration
    let config = VigilConfig::load()?;
    config.validate()?;

    // Try to set it (ignore if another thread beat us)
    let _ = CONFIG.set(config.clone());

    // Return the stored config (either ours or another thread's)
    Ok(CONFIG.get().expect("config was just set"))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
/// Returns the validated configuration.
pub fn init_config() -> VigilResult<&'static VigilConfig> {
    get_config()
}
