//! Request/response transport over a half-duplex serial line.
//!
//! # Architecture
//!
//! ```text
//! ArestClient ──> Transport::request
//!                   │
//!                   ├─ RequestGate   one cycle in flight per port
//!                   ├─ Framer        raw reads -> one ResponseFrame
//!                   └─ Watchdog      stall detection, close + reopen
//! ```
//!
//! `SerialTransport` is the serial implementation. Any other backend (an
//! HTTP client, a test double) only has to implement [`Transport`].

pub mod framer;
pub mod gate;
pub mod serial;
pub mod watchdog;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::ArestResult;
use crate::port::PortConfiguration;
use async_trait::async_trait;
use std::borrow::Cow;
use std::time::Duration;

pub use framer::{FrameError, Framer};
pub use gate::{GateGuard, RequestGate};
pub use serial::{MetricsSnapshot, SerialTransport};
pub use watchdog::{ReconnectPolicy, Watchdog, WatchdogState};

/// Line ending the firmware expects after each command.
pub const DEFAULT_LINE_ENDING: &str = "\n\r";

/// Byte sequence that ends a response frame.
pub const DEFAULT_TERMINATOR: &str = "\n";

/// Size of a single read.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Sends one command line and returns the matching response frame.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `command` is sent without its line ending; the transport appends it.
    async fn request(&self, cancel: &CancelToken, command: &str) -> ArestResult<ResponseFrame>;
}

/// One complete response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    bytes: Vec<u8>,
}

impl ResponseFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The frame as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// An empty frame comes from a zero-length read with nothing before it.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for ResponseFrame {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

/// Settings for a [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Serial settings; `port.timeout` is the poll interval of the framer.
    pub port: PortConfiguration,
    /// Watchdog timeout for one request cycle.
    pub request_timeout: Duration,
    pub line_ending: String,
    pub terminator: String,
    pub chunk_size: usize,
    /// Wait after each successful open; boards reset when the port opens.
    pub settle_delay: Duration,
    pub reconnect: ReconnectPolicy,
    /// Log raw command lines and frames at debug level.
    pub trace_frames: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: PortConfiguration::default(),
            request_timeout: Duration::from_secs(5),
            line_ending: DEFAULT_LINE_ENDING.to_string(),
            terminator: DEFAULT_TERMINATOR.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            settle_delay: Duration::from_secs(1),
            reconnect: ReconnectPolicy::default(),
            trace_frames: false,
        }
    }
}

impl From<&Config> for TransportConfig {
    fn from(config: &Config) -> Self {
        let serial = &config.serial;
        let watchdog = &config.watchdog;
        Self {
            port: PortConfiguration {
                baud_rate: serial.baud_rate,
                timeout: serial.poll_interval(),
                ..PortConfiguration::default()
            },
            request_timeout: watchdog.timeout(),
            line_ending: serial.line_ending.clone(),
            terminator: serial.frame_terminator.clone(),
            chunk_size: serial.read_chunk_size,
            settle_delay: serial.settle(),
            reconnect: ReconnectPolicy {
                backoff: watchdog.reconnect_backoff(),
                max_attempts: match watchdog.max_reconnect_attempts {
                    0 => None,
                    n => Some(n),
                },
            },
            trace_frames: config.logging.trace_frames,
        }
    }
}
