//! timeslice configuration
//!
//! Scheduler, host and logging settings, read from TOML.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (TIMESLICE_LOG)
//! 3. File given with --config
//! 4. User-level (~/.config/timeslice/config.toml)
//! 5. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use timeslice::util::config::Config;
//!
//! let config: Config = toml::from_str("[host]\nyield_interval_ms = 8.0").unwrap();
//! assert_eq!(config.host.yield_interval_ms, 8.0);
//! assert!(config.scheduler.enable_debugging);
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::runtime::host::HostConfig;
use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding `[log] level`.
pub const LOG_ENV: &str = "TIMESLICE_LOG";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Host settings
    #[serde(default)]
    pub host: HostConfig,
    /// Log settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

impl Config {
    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = &self.host;
        if !(host.yield_interval_ms > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "host.yield_interval_ms must be positive, got {}",
                host.yield_interval_ms
            )));
        }
        if !(host.max_yield_interval_ms >= host.yield_interval_ms) {
            return Err(ConfigError::InvalidValue(format!(
                "host.max_yield_interval_ms ({}) is below host.yield_interval_ms ({})",
                host.max_yield_interval_ms, host.yield_interval_ms
            )));
        }
        if self.scheduler.profiling_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.profiling_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a `TIMESLICE_LOG`-style override to the log level.
    pub fn apply_log_override(
        &mut self,
        value: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = value {
            self.log.level = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{}={}", LOG_ENV, value)))?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let value = std::env::var(LOG_ENV).ok();
        self.apply_log_override(value.as_deref())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("timeslice"));
    }

    // Fallback to ~/.config/timeslice
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("timeslice"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("timeslice"));
    }

    None
}

/// Get the user config file path (~/.config/timeslice/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Check if user config exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

/// Load and validate a configuration file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
    config.validate()?;
    Ok(config)
}

/// Load user-level configuration
/// Returns default config if file doesn't exist
pub fn load_user_config() -> Result<Config, ConfigError> {
    let path = match get_config_path() {
        Some(p) => p,
        None => return Ok(Config::default()),
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    load_config_file(&path)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config_file(
    config: &Config,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }

    let content = config.to_toml()?;
    fs::write(path, content).map_err(ConfigError::IoError)?;

    Ok(())
}

/// Save user-level configuration
pub fn save_user_config(config: &Config) -> Result<(), ConfigError> {
    let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config_file(config, &path)
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    InvalidValue(String),
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::NoConfigDir => write!(f, "Cannot determine config directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::SerializeError(e) => Some(e),
            ConfigError::InvalidValue(_) | ConfigError::NoConfigDir => None,
        }
    }
}
