//! Serial implementation of [`Transport`].
//!
//! One request cycle:
//!
//! 1. acquire the [`RequestGate`] (or fail with `Cancelled`);
//! 2. on a blocking thread: discard stale input, write the command line,
//!    run the [`Framer`], and report on a oneshot channel;
//! 3. race that channel against the [`Watchdog`] timer and the caller's
//!    cancellation;
//! 4. on a stall, stop and join the reader, drop the port, reopen it, and
//!    return `Timeout`. The gate is held until the port has been replaced.

use super::framer::{FrameError, Framer};
use super::gate::RequestGate;
use super::watchdog::{Watchdog, WatchdogState};
use super::{ResponseFrame, Transport, TransportConfig};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{ArestError, ArestResult};
use crate::port::{PortAdapter, PortError, PortOpener, SerialPortAdapter, SystemPortOpener};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type SharedPort = Arc<Mutex<PortAdapter>>;

/// The port slot guarded by the request gate. `None` after a reconnect cycle
/// gave up.
#[derive(Debug, Default)]
struct Link {
    port: Option<SharedPort>,
}

#[derive(Debug, Default)]
struct Metrics {
    requests: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    stalls: AtomicU64,
    reconnects: AtomicU64,
    read_errors: AtomicU64,
}

/// Counters since the transport was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub stalls: u64,
    pub reconnects: u64,
    pub read_errors: u64,
}

/// Result of the blocking half of a request cycle.
#[derive(Debug)]
enum Exchange {
    Frame(ResponseFrame),
    Write(PortError),
    Read(PortError),
    Interrupted,
}

/// Reliable request/response channel over one serial port.
#[derive(Debug)]
pub struct SerialTransport {
    address: String,
    config: TransportConfig,
    opener: Arc<dyn PortOpener>,
    framer: Framer,
    gate: RequestGate<Link>,
    watchdog: Watchdog,
    metrics: Metrics,
}

impl SerialTransport {
    /// Open the device at `address`.
    ///
    /// On failure the ports present on the system are logged to help pick
    /// the right address; none of them is tried instead.
    pub async fn open(address: impl Into<String>, config: TransportConfig) -> ArestResult<Self> {
        Self::open_with(address, config, Arc::new(SystemPortOpener)).await
    }

    /// Like [`open`](Self::open), with a custom source of port handles.
    pub async fn open_with(
        address: impl Into<String>,
        config: TransportConfig,
        opener: Arc<dyn PortOpener>,
    ) -> ArestResult<Self> {
        let transport = Self {
            address: address.into(),
            framer: Framer::new(config.terminator.as_bytes(), config.chunk_size),
            watchdog: Watchdog::new(config.request_timeout, config.reconnect.clone()),
            gate: RequestGate::new(Link::default()),
            metrics: Metrics::default(),
            opener,
            config,
        };

        let port = transport.open_port().await.map_err(|source| {
            transport.log_available_ports();
            ArestError::Open {
                address: transport.address.clone(),
                source,
            }
        })?;
        transport.gate.acquire(&CancelToken::new()).await?.port = Some(port);

        info!(
            port = %transport.address,
            baud = transport.config.port.baud_rate,
            "serial transport open"
        );
        Ok(transport)
    }

    /// Open the device named by `serial.address` (aliases resolved) with the
    /// settings from `config`.
    pub async fn from_config(config: &Config) -> ArestResult<Self> {
        Self::from_config_with(config, Arc::new(SystemPortOpener)).await
    }

    /// Like [`from_config`](Self::from_config), with a custom source of port handles.
    pub async fn from_config_with(
        config: &Config,
        opener: Arc<dyn PortOpener>,
    ) -> ArestResult<Self> {
        config.validate()?;
        let address = config.serial.device_address()?;
        Self::open_with(address, TransportConfig::from(config), opener).await
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        self.watchdog.state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let m = &self.metrics;
        MetricsSnapshot {
            requests: m.requests.load(Ordering::Relaxed),
            bytes_written: m.bytes_written.load(Ordering::Relaxed),
            bytes_read: m.bytes_read.load(Ordering::Relaxed),
            stalls: m.stalls.load(Ordering::Relaxed),
            reconnects: m.reconnects.load(Ordering::Relaxed),
            read_errors: m.read_errors.load(Ordering::Relaxed),
        }
    }

    /// Close the port and open it again, waiting for in-flight requests first.
    pub async fn reconnect(&self, cancel: &CancelToken) -> ArestResult<()> {
        let mut link = self.gate.acquire(cancel).await?;
        self.reopen(&mut link)
            .await
            .map(|_| ())
            .map_err(|source| ArestError::Open {
                address: self.address.clone(),
                source,
            })
    }

    /// Send `command` (without line ending) and wait for its frame.
    pub async fn request(&self, cancel: &CancelToken, command: &str) -> ArestResult<ResponseFrame> {
        let mut link = self.gate.acquire(cancel).await?;

        let port = match link.port.clone() {
            Some(port) => port,
            None => {
                debug!(port = %self.address, "no open port, reconnecting before request");
                self.reopen(&mut link).await.map_err(|source| ArestError::Open {
                    address: self.address.clone(),
                    source,
                })?
            }
        };
        cancel.check()?;

        let line = format!("{command}{}", self.config.line_ending).into_bytes();
        let line_len = line.len() as u64;
        if self.config.trace_frames {
            debug!(port = %self.address, command, "sending command");
        }
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let abort = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let job = {
            let port = Arc::clone(&port);
            let abort = Arc::clone(&abort);
            let framer = self.framer.clone();
            tokio::task::spawn_blocking(move || {
                let mut port = port.lock();
                let outcome = exchange(&framer, &mut **port, &line, &abort);
                // The receiver is gone if the watchdog or the caller won.
                let _ = tx.send(outcome);
            })
        };
        self.watchdog.arm();

        let outcome = tokio::select! {
            outcome = rx => outcome.unwrap_or_else(|_| {
                let lost = io::Error::other("reader task ended without a result");
                Exchange::Read(PortError::Io(lost))
            }),
            _ = self.watchdog.expired() => {
                warn!(
                    port = %self.address,
                    command,
                    timeout = ?self.watchdog.timeout(),
                    "no response, resetting port"
                );
                self.metrics.stalls.fetch_add(1, Ordering::Relaxed);
                abort.store(true, Ordering::Release);
                if let Err(e) = job.await {
                    debug!(error = %e, "reader task failed");
                }
                drop(port);
                if let Err(e) = self.reopen(&mut link).await {
                    warn!(port = %self.address, error = %e, "port left closed after stall");
                }
                return Err(ArestError::Timeout(self.watchdog.timeout()));
            }
            _ = cancel.cancelled() => {
                abort.store(true, Ordering::Release);
                if let Err(e) = job.await {
                    debug!(error = %e, "reader task failed");
                }
                self.watchdog.disarm();
                debug!(port = %self.address, command, "request cancelled in flight");
                return Err(ArestError::Cancelled);
            }
        };
        self.watchdog.disarm();

        match outcome {
            Exchange::Frame(frame) => {
                self.metrics
                    .bytes_written
                    .fetch_add(line_len, Ordering::Relaxed);
                self.metrics
                    .bytes_read
                    .fetch_add(frame.len() as u64, Ordering::Relaxed);
                if self.config.trace_frames {
                    debug!(port = %self.address, frame = %frame.text(), "frame received");
                }
                Ok(frame)
            }
            Exchange::Write(e) => {
                warn!(port = %self.address, error = %e, "write failed");
                Err(ArestError::Write(e))
            }
            Exchange::Read(e) => {
                self.metrics
                    .bytes_written
                    .fetch_add(line_len, Ordering::Relaxed);
                self.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                warn!(port = %self.address, error = %e, "read failed");
                Err(ArestError::Read(e))
            }
            // Only the watchdog and cancellation set the abort flag.
            Exchange::Interrupted => Err(ArestError::Cancelled),
        }
    }

    /// Drop the current port (closing it) and run a reconnect cycle.
    async fn reopen(&self, link: &mut Link) -> Result<SharedPort, PortError> {
        link.port = None;
        let port = self
            .watchdog
            .recover(|attempt| {
                debug!(port = %self.address, attempt, "reopening port");
                self.open_port()
            })
            .await?;
        self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
        link.port = Some(Arc::clone(&port));
        Ok(port)
    }

    async fn open_port(&self) -> Result<SharedPort, PortError> {
        let opener = Arc::clone(&self.opener);
        let address = self.address.clone();
        let port_config = self.config.port.clone();

        let port = tokio::task::spawn_blocking(move || opener.open(&address, &port_config))
            .await
            .map_err(|e| PortError::Io(io::Error::other(e)))??;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        Ok(Arc::new(Mutex::new(port)))
    }

    fn log_available_ports(&self) {
        match self.opener.available_ports() {
            Ok(ports) if ports.is_empty() => warn!("no serial ports found"),
            Ok(ports) => {
                for name in ports {
                    warn!(port = %name, "found serial port");
                }
            }
            Err(e) => warn!(error = %e, "could not list serial ports"),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn request(&self, cancel: &CancelToken, command: &str) -> ArestResult<ResponseFrame> {
        SerialTransport::request(self, cancel, command).await
    }
}

fn exchange(
    framer: &Framer,
    port: &mut dyn SerialPortAdapter,
    line: &[u8],
    abort: &AtomicBool,
) -> Exchange {
    // Bytes left over from an abandoned cycle would corrupt this frame.
    if let Err(e) = port.clear_buffers() {
        debug!(error = %e, "could not discard stale input");
    }
    if let Err(e) = port.write_bytes(line) {
        return Exchange::Write(e);
    }

    match framer.read_frame(port, &|| abort.load(Ordering::Acquire)) {
        Ok(frame) => Exchange::Frame(frame),
        Err(FrameError::Port(e)) => Exchange::Read(e),
        Err(FrameError::Interrupted) => {
            let _ = port.clear_buffers();
            Exchange::Interrupted
        }
    }
}
