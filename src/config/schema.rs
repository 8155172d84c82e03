//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line settings
    pub serial: SerialConfig,
    /// Stall detection and reconnect
    pub watchdog: WatchdogConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the transport cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be positive"));
        }
        if self.serial.read_chunk_size == 0 {
            return Err(ConfigError::validation("serial.read_chunk_size", "must be positive"));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::validation("serial.poll_interval_ms", "must be positive"));
        }
        if self.serial.line_ending.is_empty() {
            return Err(ConfigError::validation("serial.line_ending", "must not be empty"));
        }
        if self.serial.frame_terminator.is_empty() {
            return Err(ConfigError::validation("serial.frame_terminator", "must not be empty"));
        }
        if self.watchdog.timeout_ms == 0 {
            return Err(ConfigError::validation("watchdog.timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Serial line configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path or alias; optional because callers may pass it directly
    pub address: Option<String>,
    /// Baud rate; aREST serial firmware uses 115200
    pub baud_rate: u32,
    /// Read timeout of one framer poll, in milliseconds
    pub poll_interval_ms: u64,
    /// Bytes requested per read
    pub read_chunk_size: usize,
    /// Appended to every command line
    pub line_ending: String,
    /// Marks the end of a response frame
    pub frame_terminator: String,
    /// Wait after opening the port while the board resets, in milliseconds
    pub settle_ms: u64,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            address: None,
            baud_rate: 115_200,
            poll_interval_ms: 50,
            read_chunk_size: 2048,
            line_ending: "\n\r".to_string(),
            frame_terminator: "\n".to_string(),
            settle_ms: 1000,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_address(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured device path, with aliases resolved.
    pub fn device_address(&self) -> ConfigResult<String> {
        self.address
            .as_deref()
            .map(|name| self.resolve_address(name))
            .ok_or_else(|| ConfigError::MissingRequired("serial.address".to_string()))
    }
}

/// Watchdog configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Time a request may take before the port is reset
    pub timeout_ms: u64,
    /// Sleep between reopen attempts
    pub reconnect_backoff_ms: u64,
    /// Reopen attempts per stall; 0 retries forever
    pub max_reconnect_attempts: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            reconnect_backoff_ms: 1000,
            max_reconnect_attempts: 10,
        }
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error" (or a full filter directive)
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Log raw command lines and response frames at debug level
    pub trace_frames: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            trace_frames: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
