//! Port-specific error types.
//!
//! Errors raised by a single port handle. The transport maps them onto the
//! public [`ArestError`](crate::error::ArestError) taxonomy depending on where
//! they occur (open, write or read).

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A read or write did not complete within the port timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// True when the error only means "no byte arrived during this poll".
    ///
    /// The framer polls with a short read timeout, so these are expected and
    /// never surface to callers.
    pub fn is_idle_poll(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyUSB0");

        let err = PortError::config("Invalid baud rate");
        assert_eq!(err.to_string(), "Configuration error: Invalid baud rate");
    }

    #[test]
    fn test_timeout_error() {
        let err = PortError::timeout(Duration::from_millis(500));
        assert!(err.to_string().contains("500ms"));
    }

    #[test]
    fn test_idle_poll_classification() {
        assert!(PortError::timeout(Duration::from_millis(10)).is_idle_poll());
        assert!(PortError::Io(io::Error::from(io::ErrorKind::TimedOut)).is_idle_poll());
        assert!(PortError::Io(io::Error::from(io::ErrorKind::WouldBlock)).is_idle_poll());
        assert!(!PortError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_idle_poll());
        assert!(!PortError::not_found("COM9").is_idle_poll());
    }
}
