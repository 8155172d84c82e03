//! arest-link library
//!
//! Request/response access to boards running the aREST firmware over a
//! serial line. Every call writes one command line and waits for exactly
//! one JSON response frame; calls sharing a port are serialized, a stalled
//! exchange trips a watchdog that reopens the port, and every operation
//! accepts a [`CancelToken`].
//!
//! # Modules
//!
//! - `client`: the [`Arest`] operations and response decoding
//! - `transport`: request gate, framer, watchdog and the serial transport
//! - `port`: port abstraction over `serialport`, plus mocks
//! - `config`: TOML configuration with environment overrides
//! - `logging`: tracing subscriber setup
//! - `cancel`: cancellation tokens
//! - `error`: the [`ArestError`] taxonomy
//! - `types`: pin levels, modes and switch states
//!
//! # Example
//!
//! ```rust,no_run
//! use arest_link::{Arest, ArestClient, CancelToken, Level, Mode, TransportConfig};
//!
//! # async fn run() -> arest_link::ArestResult<()> {
//! let client = ArestClient::connect("/dev/ttyACM0", TransportConfig::default()).await?;
//! let cancel = CancelToken::new();
//!
//! client.set_pin_mode(&cancel, 13, Mode::Output).await?;
//! client.digital_write(&cancel, 13, Level::High).await?;
//! let temperature = client.read_value(&cancel, "temperature").await?;
//! println!("temperature = {temperature}");
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use cancel::CancelToken;
pub use client::{decode, Arest, ArestClient, Command};
pub use error::{ArestError, ArestResult};
pub use port::{
    MockPortOpener, MockRead, MockSerialPort, PortConfiguration, PortError, PortOpener,
    SerialPortAdapter, SyncSerialPort, SystemPortOpener,
};
pub use transport::{
    MetricsSnapshot, ReconnectPolicy, ResponseFrame, SerialTransport, Transport,
    TransportConfig, WatchdogState,
};
pub use types::{Level, Mode, State};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
