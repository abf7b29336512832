//! Bridge configuration.
//!
//! Settings are read from `~/.wwt-bridge/config.ini`. Every key is optional;
//! missing keys keep their defaults.
//!
//! ```ini
//! [engine]
//! frame_interval_ms = 16
//!
//! [relay]
//! channel_capacity = 64
//!
//! [logging]
//! directory = ~/.wwt-bridge/logs
//! file = wwt-bridge.log
//! level = info
//!
//! [collections]
//! preload = https://example.org/a.wtml, https://example.org/b.wtml
//! ```

mod file;

use std::path::PathBuf;
use std::time::Duration;

pub use file::{config_directory, config_file_path, ConfigError};

/// Default frame interval (about 60 frames per second).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Default capacity of the relay's message channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "wwt-bridge.log";

/// Accepted values for `[logging] level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
    pub collections: CollectionsConfig,
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How often engine state is polled and simulated frames advance.
    pub frame_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Capacity of the inbound and outbound message channels.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file: String,
    /// Default filter level; `RUST_LOG` overrides it.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
            level: "info".to_string(),
        }
    }
}

/// `[collections]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionsConfig {
    /// Collection URLs loaded at startup.
    pub preload: Vec<String>,
}

impl BridgeConfig {
    /// Set the frame interval.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.engine.frame_interval = interval;
        self
    }

    /// Add a collection to preload.
    pub fn with_preload(mut self, url: impl Into<String>) -> Self {
        self.collections.preload.push(url.into());
        self
    }
}
