use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Read(#[source] std::io::Error),
    #[error("could not write config file: {0}")]
    Write(#[source] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config directory available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub runner: RunnerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the local database file
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "sitewatch.db".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Attempts per check before a monitor is declared down
    pub retry_attempts: u32,
    /// Total request timeout per attempt
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            timeout_seconds: 15,
            connect_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Lock file preventing overlapping ticks
    pub lock_path: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { lock_path: "sitewatch.lock".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sitewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let base = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home) = env::var("HOME") {
        path::PathBuf::from(home).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(base.join("sitewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current Configuration:")?;
        writeln!(f, "  Database")?;
        writeln!(f, "    Path: {}", self.database.path)?;
        writeln!(f, "  Probe")?;
        writeln!(f, "    Retry Attempts: {}", self.probe.retry_attempts)?;
        writeln!(f, "    Timeout: {}s", self.probe.timeout_seconds)?;
        writeln!(f, "    Connect Timeout: {}s", self.probe.connect_timeout_seconds)?;
        writeln!(f, "  Runner")?;
        writeln!(f, "    Lock Path: {}", self.runner.lock_path)?;
        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file.
    ///
    /// Creates a default config at the default path, or the specified
    /// path, if one does not exist yet.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }
}
