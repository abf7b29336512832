//! Loading and saving `config.ini`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::{BridgeConfig, LOG_LEVELS};

/// Errors from reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write the config file
    #[error("Failed to write config file: {0}")]
    WriteError(#[source] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::WriteError)?;
        }
        to_ini(self)
            .write_to_file(path)
            .map_err(ConfigError::WriteError)
    }

    /// Write the default config file if none exists. Returns its path.
    pub fn ensure_exists(path: &Path) -> Result<PathBuf, ConfigError> {
        if !path.exists() {
            Self::default().save_to(path)?;
        }
        Ok(path.to_path_buf())
    }
}

/// Path to the config directory (`~/.wwt-bridge`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wwt-bridge")
}

/// Path to the config file (`~/.wwt-bridge/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

fn parse_ini(ini: &Ini) -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::default();

    // [engine] section
    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("frame_interval_ms") {
            let ms = parse_positive("engine", "frame_interval_ms", v)?;
            config.engine.frame_interval = Duration::from_millis(ms);
        }
    }

    // [relay] section
    if let Some(section) = ini.section(Some("relay")) {
        if let Some(v) = section.get("channel_capacity") {
            let capacity = parse_positive("relay", "channel_capacity", v)?;
            config.relay.channel_capacity = usize::try_from(capacity).map_err(|_| {
                ConfigError::invalid("relay", "channel_capacity", v, "value too large")
            })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("level") {
            let level = v.trim().to_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::invalid(
                    "logging",
                    "level",
                    v,
                    "must be one of: trace, debug, info, warn, error",
                ));
            }
            config.logging.level = level;
        }
    }

    // [collections] section
    if let Some(section) = ini.section(Some("collections")) {
        if let Some(v) = section.get("preload") {
            config.collections.preload = v
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    Ok(config)
}

fn to_ini(config: &BridgeConfig) -> Ini {
    let mut ini = Ini::new();
    ini.with_section(Some("engine")).set(
        "frame_interval_ms",
        config.engine.frame_interval.as_millis().to_string(),
    );
    ini.with_section(Some("relay")).set(
        "channel_capacity",
        config.relay.channel_capacity.to_string(),
    );
    ini.with_section(Some("logging"))
        .set("directory", config.logging.directory.to_string_lossy())
        .set("file", config.logging.file.as_str())
        .set("level", config.logging.level.as_str());
    ini.with_section(Some("collections"))
        .set("preload", config.collections.preload.join(", "));
    ini
}

fn parse_positive(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(section, key, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::invalid(section, key, value, "must be a positive integer")),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}
