//! Shared test utilities for arest-link integration tests.
//!
//! This module provides:
//! - A transport configuration with short timeouts and no settle delay
//! - A harness wiring a scripted `MockSerialPort` into a real `SerialTransport`
//! - Builders for common aREST replies

#![allow(dead_code)]

use arest_link::port::{MockPortOpener, MockSerialPort, PortConfiguration};
use arest_link::transport::{ReconnectPolicy, SerialTransport, TransportConfig};
use arest_link::ArestClient;
use std::sync::Arc;
use std::time::Duration;

pub const ADDRESS: &str = "/dev/ttyACM0";

/// Transport settings scaled down so stalls resolve in milliseconds.
pub fn fast_config() -> TransportConfig {
    TransportConfig {
        port: PortConfiguration {
            timeout: Duration::from_millis(5),
            ..PortConfiguration::default()
        },
        request_timeout: Duration::from_millis(250),
        settle_delay: Duration::ZERO,
        reconnect: ReconnectPolicy {
            backoff: Duration::from_millis(5),
            max_attempts: Some(3),
        },
        ..TransportConfig::default()
    }
}

/// A client over mock ports, plus handles to inspect them.
pub struct TestHarness {
    pub client: ArestClient,
    pub opener: MockPortOpener,
    pub ports: Vec<MockSerialPort>,
}

impl TestHarness {
    /// One mock port, reused on every (re)open.
    pub async fn new() -> Self {
        Self::with_ports(1).await
    }

    /// `count` mock ports handed out in order on successive opens.
    pub async fn with_ports(count: usize) -> Self {
        let ports: Vec<_> = (0..count)
            .map(|i| MockSerialPort::new(format!("MOCK{i}")))
            .collect();
        Self::build(ports, fast_config()).await
    }

    pub async fn build(ports: Vec<MockSerialPort>, config: TransportConfig) -> Self {
        let opener = MockPortOpener::with_ports(ports.iter().cloned());
        let transport = SerialTransport::open_with(ADDRESS, config, Arc::new(opener.clone()))
            .await
            .expect("mock port should open");

        Self {
            client: ArestClient::new(transport),
            opener,
            ports,
        }
    }

    /// The port opened first.
    pub fn port(&self) -> &MockSerialPort {
        &self.ports[0]
    }

    pub fn transport(&self) -> &SerialTransport {
        self.client.transport()
    }
}

/// Board identity fields the firmware appends to every reply.
const BOARD: &str = r#""id": "1", "name": "board", "hardware": "arduino", "connected": true"#;

/// `{"return_value": <value>}` followed by the firmware's line ending.
pub fn return_value(value: impl std::fmt::Display) -> String {
    format!("{{\"return_value\": {value}, {BOARD}}}\r\n")
}

/// A variable reply as the firmware formats it.
pub fn variable(name: &str, json_value: &str) -> String {
    format!("{{\"{name}\": {json_value}, {BOARD}}}\r\n")
}
