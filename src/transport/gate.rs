//! Serializes access to the shared line.
//!
//! The gate owns the resource it protects, so the only way to touch the port
//! is through a [`GateGuard`]. Dropping the guard releases the gate on every
//! exit path, including early returns and cancelled futures.

use crate::cancel::CancelToken;
use crate::error::{ArestError, ArestResult};
use std::ops::{Deref, DerefMut};
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug)]
pub struct RequestGate<T> {
    inner: Mutex<T>,
}

/// Proof of exclusive access; releases the gate when dropped.
#[derive(Debug)]
pub struct GateGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> RequestGate<T> {
    pub fn new(resource: T) -> Self {
        Self {
            inner: Mutex::new(resource),
        }
    }

    /// Wait for the gate, giving up if `cancel` fires first.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self, cancel: &CancelToken) -> ArestResult<GateGuard<'_, T>> {
        cancel.check()?;
        let guard = tokio::select! {
            guard = self.inner.lock() => guard,
            _ = cancel.cancelled() => return Err(ArestError::Cancelled),
        };
        trace!("request gate acquired");
        Ok(GateGuard { guard })
    }

    /// True while some request holds the gate.
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        trace!("request gate released");
    }
}
