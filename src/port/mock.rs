//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` simulates an aREST board: replies are scripted per command
//! line and queued when that command is written, so request/response cycles
//! can be exercised without hardware. `MockPortOpener` hands mock ports to a
//! transport and can simulate a device that refuses to open.

use super::error::PortError;
use super::traits::{PortAdapter, PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// One scripted outcome of a `read_bytes` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// Bytes delivered by the device (split across reads if the buffer is small).
    Data(Vec<u8>),
    /// A zero-length read.
    Eof,
    /// A hard read failure.
    Fail(io::ErrorKind),
}

impl MockRead {
    /// Convenience constructor for a data chunk.
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        Self::Data(bytes.as_ref().to_vec())
    }
}

#[derive(Debug, Default)]
struct MockPortState {
    read_queue: VecDeque<MockRead>,
    write_log: Vec<Vec<u8>>,
    replies: HashMap<String, Vec<MockRead>>,
    fail_next_write: Option<io::ErrorKind>,
    timeout: Duration,
    /// A command was written and its reply has not been consumed yet.
    cycle_open: bool,
    /// A read was attempted since the last write.
    read_since_write: bool,
    overlapping_writes: usize,
    clear_count: usize,
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can keep one handle while the transport owns
/// another.
///
/// # Example
/// ```
/// use arest_link::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.reply("/digital/5", "{\"return_value\": 1}\r\n");
///
/// port.write_bytes(b"/digital/5\n\r").unwrap();
///
/// let mut buffer = [0u8; 64];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"{\"return_value\": 1}\r\n");
/// assert_eq!(port.written_lines(), vec!["/digital/5"]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(10),
                ..Default::default()
            })),
        }
    }

    /// Reply to `command` with a single data chunk every time it is written.
    pub fn reply(&self, command: &str, response: impl AsRef<[u8]>) {
        self.reply_with(command, vec![MockRead::data(response)]);
    }

    /// Reply to `command` with an arbitrary sequence of read outcomes.
    pub fn reply_with(&self, command: &str, reads: Vec<MockRead>) {
        self.state.lock().replies.insert(command.to_string(), reads);
    }

    /// Remove the scripted reply for `command`, so the device stays silent.
    pub fn silence(&self, command: &str) {
        self.state.lock().replies.remove(command);
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.push_back(MockRead::data(data));
    }

    /// Make the next write fail with the given I/O error kind.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next_write = Some(kind);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Written command lines with their line ending stripped.
    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .write_log
            .iter()
            .map(|w| command_key(w))
            .collect()
    }

    /// Number of writes that arrived while the previous command's cycle was
    /// still open, i.e. before any read had been attempted for it or before its
    /// scripted reply had been consumed.
    pub fn overlapping_writes(&self) -> usize {
        self.state.lock().overlapping_writes
    }

    /// Number of times `clear_buffers` was called.
    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }

    /// Get the number of scripted reads still queued.
    pub fn pending_reads(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

fn command_key(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if let Some(kind) = state.fail_next_write.take() {
            return Err(PortError::Io(io::Error::new(kind, "mock write failure")));
        }

        if state.cycle_open {
            state.overlapping_writes += 1;
        }
        state.write_log.push(data.to_vec());
        state.cycle_open = true;
        state.read_since_write = false;

        if let Some(reads) = state.replies.get(&command_key(data)).cloned() {
            state.read_queue.extend(reads);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        state.read_since_write = true;

        let Some(next) = state.read_queue.pop_front() else {
            // Behave like a real port with a read timeout: block, then time out.
            let timeout = state.timeout;
            drop(state);
            std::thread::sleep(timeout);
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no data available",
            )));
        };

        let result = match next {
            MockRead::Data(mut bytes) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.read_queue.push_front(MockRead::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            MockRead::Eof => Ok(0),
            MockRead::Fail(kind) => Err(PortError::Io(io::Error::new(kind, "mock read failure"))),
        };

        // The last scripted outcome ends the cycle.
        if state.read_queue.is_empty() {
            state.cycle_open = false;
        }
        result
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        // Clearing after the reader has run abandons the cycle; clearing right
        // after a write leaves it open.
        if state.read_since_write {
            state.cycle_open = false;
        }
        state.clear_count += 1;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("pending_reads", &self.pending_reads())
            .finish()
    }
}

#[derive(Debug, Default)]
struct OpenerState {
    ports: VecDeque<MockSerialPort>,
    failures_remaining: u32,
    attempts: u32,
    opened: u32,
    addresses: Vec<String>,
}

/// Hands out `MockSerialPort`s in order; the last one is reused once the
/// others are exhausted.
#[derive(Debug, Clone, Default)]
pub struct MockPortOpener {
    state: Arc<Mutex<OpenerState>>,
}

impl MockPortOpener {
    /// An opener that always returns (a handle to) `port`.
    pub fn new(port: MockSerialPort) -> Self {
        Self::with_ports([port])
    }

    /// An opener returning `ports` in order for successive opens.
    pub fn with_ports(ports: impl IntoIterator<Item = MockSerialPort>) -> Self {
        let opener = Self::default();
        opener.state.lock().ports = ports.into_iter().collect();
        opener
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().failures_remaining = count;
    }

    /// Total open attempts, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    /// Successful opens.
    pub fn opened(&self) -> u32 {
        self.state.lock().opened
    }

    /// Addresses passed to each successful open.
    pub fn addresses(&self) -> Vec<String> {
        self.state.lock().addresses.clone()
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, address: &str, config: &PortConfiguration) -> Result<PortAdapter, PortError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(PortError::not_found(address));
        }

        let port = if state.ports.len() > 1 {
            state.ports.pop_front()
        } else {
            state.ports.front().cloned()
        };
        let mut port = port.ok_or_else(|| PortError::not_found(address))?;
        port.set_timeout(config.timeout)?;

        state.opened += 1;
        state.addresses.push(address.to_string());
        Ok(Box::new(port))
    }

    fn available_ports(&self) -> Result<Vec<String>, PortError> {
        Ok(self.state.lock().ports.iter().map(|p| p.name.clone()).collect())
    }
}
