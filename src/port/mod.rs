//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialPortAdapter` and `PortOpener` traits, the
//! `serialport`-backed implementation, and mocks for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockRead, MockSerialPort};
pub use sync_port::{available_ports, PortInfo, SyncSerialPort, SystemPortOpener};
pub use traits::*;
