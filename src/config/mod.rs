//! Configuration module for arest-link.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `AREST_LINK_CONFIG` environment variable (explicit path)
//! 2. `./arest-link.toml` (current directory)
//! 3. `~/.config/arest-link/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\arest-link\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `AREST_LINK_<SECTION>_<KEY>`, for example:
//! - `AREST_LINK_SERIAL_ADDRESS=/dev/ttyACM0`
//! - `AREST_LINK_WATCHDOG_TIMEOUT_MS=2000`
//! - `AREST_LINK_LOGGING_TRACE_FRAMES=1`
//!
//! # Example
//!
//! ```rust,no_run
//! use arest_link::config::ConfigLoader;
//! use arest_link::transport::TransportConfig;
//!
//! let loader = ConfigLoader::load()?;
//! let transport_config = TransportConfig::from(loader.config());
//! println!("watchdog: {:?}", transport_config.request_timeout);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, WatchdogConfig};
