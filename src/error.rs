//! Error taxonomy shared by every transport and the capability interface.

use crate::config::ConfigError;
use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for aREST operations.
pub type ArestResult<T> = Result<T, ArestError>;

/// Errors returned by transports and by [`Arest`](crate::client::Arest) operations.
///
/// `Open`, `Write`, `Read` and `Timeout` are transport errors: they fail the
/// current request, but the transport stays usable once it has reconnected.
/// `MalformedResponse` and `NotFound` are local to a single call. `Config`
/// only comes from the configuration-driven constructors.
#[derive(Debug, Error)]
pub enum ArestError {
    /// The port could not be opened (or reopened).
    #[error("failed to open serial port {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: PortError,
    },

    /// Writing the command line failed. Never retried automatically.
    #[error("failed to write command: {0}")]
    Write(#[source] PortError),

    /// Reading the response failed before a frame completed.
    #[error("failed to read response: {0}")]
    Read(#[source] PortError),

    /// No complete frame arrived in time; the port was closed and reopened.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The frame could not be decoded into key/value data.
    #[error("malformed response ({reason}): {frame:?}")]
    MalformedResponse { reason: String, frame: String },

    /// The response was well formed but lacked the expected key.
    #[error("key `{0}` not found in response")]
    NotFound(String),

    /// The caller's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The configuration does not describe a usable transport.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ArestError {
    pub(crate) fn malformed(reason: impl ToString, frame: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.to_string(),
            frame: frame.into(),
        }
    }

    /// True for errors raised by the transport rather than by decoding.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Write(_) | Self::Read(_) | Self::Timeout(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ArestError::Cancelled.to_string(), "operation cancelled");
        assert_eq!(
            ArestError::NotFound("return_value".into()).to_string(),
            "key `return_value` not found in response"
        );
        let err = ArestError::Open {
            address: "/dev/ttyACM0".into(),
            source: PortError::not_found("/dev/ttyACM0"),
        };
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ArestError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(ArestError::Read(PortError::config("x")).is_transport());
        assert!(!ArestError::NotFound("x".into()).is_transport());
        assert!(!ArestError::malformed("eof", "").is_transport());
        assert!(ArestError::Cancelled.is_cancelled());
        let missing = ConfigError::MissingRequired("serial.address".into());
        assert!(!ArestError::from(missing).is_transport());
    }
}
