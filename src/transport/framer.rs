//! Aggregates raw reads into one response frame.
//!
//! A frame is complete when a read chunk completes the terminator, or when a
//! read returns zero bytes. The zero-length rule means an empty response and
//! "device sent nothing, then EOF" look the same; callers see an empty frame
//! and decoding reports it as malformed.

use super::ResponseFrame;
use crate::port::{PortError, SerialPortAdapter};
use memchr::memmem;

/// Why a frame could not be produced.
#[derive(Debug)]
pub enum FrameError {
    /// A read failed. Bytes accumulated so far are dropped.
    Port(PortError),
    /// The stop check fired between polls.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct Framer {
    terminator: Vec<u8>,
    chunk_size: usize,
}

impl Framer {
    /// `terminator` must not be empty; `chunk_size` is clamped to at least 1.
    pub fn new(terminator: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            terminator: terminator.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn terminator(&self) -> &[u8] {
        &self.terminator
    }

    /// Read until a frame completes.
    ///
    /// Idle polls (read timeouts) are not errors: `should_stop` is consulted
    /// and reading continues.
    pub fn read_frame(
        &self,
        port: &mut dyn SerialPortAdapter,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<ResponseFrame, FrameError> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut frame = Vec::new();

        loop {
            if should_stop() {
                return Err(FrameError::Interrupted);
            }

            match port.read_bytes(&mut chunk) {
                Ok(0) => return Ok(ResponseFrame::new(frame)),
                Ok(n) => {
                    // The terminator may straddle the previous chunk.
                    let search_from = frame
                        .len()
                        .saturating_sub(self.terminator.len().saturating_sub(1));
                    frame.extend_from_slice(&chunk[..n]);
                    if self.contains_terminator(&frame[search_from..]) {
                        return Ok(ResponseFrame::new(frame));
                    }
                }
                Err(e) if e.is_idle_poll() => continue,
                Err(e) => return Err(FrameError::Port(e)),
            }
        }
    }

    fn contains_terminator(&self, window: &[u8]) -> bool {
        if self.terminator.is_empty() {
            return false;
        }
        memmem::find(window, &self.terminator).is_some()
    }
}
