//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "AREST_LINK";

/// Config file name in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "arest-link.toml";

/// Config file name inside the application config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory under the platform config directory
const APP_DIR: &str = "arest-link";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "AREST_LINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `AREST_LINK_CONFIG` environment variable (explicit path)
    /// 2. `./arest-link.toml` (current directory)
    /// 3. `~/.config/arest-link/config.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\arest-link\config.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values; the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Malformed environment overrides are ignored here.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|p| p.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// The per-user config file location, whether or not it exists.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Read `AREST_LINK_<key>` and parse it, if set.
fn env_value<T: FromStr>(key: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}"))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `AREST_LINK_<SECTION>_<KEY>`,
/// for example `AREST_LINK_SERIAL_ADDRESS=/dev/ttyACM0` or
/// `AREST_LINK_WATCHDOG_TIMEOUT_MS=2000`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(val) = env_value::<String>("SERIAL_ADDRESS", "address")? {
        config.serial.address = Some(val);
    }
    if let Some(val) = env_value("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = val;
    }
    if let Some(val) = env_value("SERIAL_POLL_INTERVAL_MS", "poll interval")? {
        config.serial.poll_interval_ms = val;
    }
    if let Some(val) = env_value("SERIAL_SETTLE_MS", "settle delay")? {
        config.serial.settle_ms = val;
    }

    if let Some(val) = env_value("WATCHDOG_TIMEOUT_MS", "timeout")? {
        config.watchdog.timeout_ms = val;
    }
    if let Some(val) = env_value("WATCHDOG_RECONNECT_BACKOFF_MS", "backoff")? {
        config.watchdog.reconnect_backoff_ms = val;
    }
    if let Some(val) = env_value("WATCHDOG_MAX_RECONNECT_ATTEMPTS", "attempt count")? {
        config.watchdog.max_reconnect_attempts = val;
    }

    if let Some(val) = env_value::<String>("LOGGING_LEVEL", "log level")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_FORMAT", "log format")? {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{ENV_PREFIX}_LOGGING_FORMAT"),
                    "Expected json, pretty or compact",
                ))
            }
        };
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_TRACE_FRAMES")) {
        config.logging.trace_frames = val.eq_ignore_ascii_case("true") || val == "1";
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 115_200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("AREST_LINK_WATCHDOG_TIMEOUT_MS", "2500");
        env::set_var("AREST_LINK_SERIAL_ADDRESS", "/dev/ttyACM3");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().watchdog.timeout_ms, 2500);
        assert_eq!(loader.config().serial.address.as_deref(), Some("/dev/ttyACM3"));

        env::remove_var("AREST_LINK_WATCHDOG_TIMEOUT_MS");
        env::remove_var("AREST_LINK_SERIAL_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_invalid_env_override_is_reported() {
        env::set_var("AREST_LINK_SERIAL_BAUD_RATE", "fast");

        let mut config = Config::default();
        let result = apply_env_overrides(&mut config);
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        env::remove_var("AREST_LINK_SERIAL_BAUD_RATE");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arest-link.toml");

        let mut config = Config::default();
        config.serial.address = Some("/dev/ttyUSB7".to_string());
        config.watchdog.max_reconnect_attempts = 3;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(reloaded.config().serial.address.as_deref(), Some("/dev/ttyUSB7"));
        assert_eq!(reloaded.config().watchdog.max_reconnect_attempts, 3);
    }

    #[test]
    #[serial]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[watchdog]\ntimeout_ms = 0\n").unwrap();

        let result = ConfigLoader::load_from(&path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    #[serial]
    fn test_trace_frames_flag() {
        env::set_var("AREST_LINK_LOGGING_TRACE_FRAMES", "1");

        let loader = ConfigLoader::with_defaults();
        assert!(loader.config().logging.trace_frames);

        env::remove_var("AREST_LINK_LOGGING_TRACE_FRAMES");
    }
}
