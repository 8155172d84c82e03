//! Stall detection and recovery.
//!
//! ```text
//!            arm()               disarm()
//!   Idle ───────────> Armed ───────────────> Idle
//!                       │
//!                       │ timer fires
//!                       v
//!                   Recovering ── reopen succeeds / gives up ──> Idle
//! ```
//!
//! The watchdog only tracks state, owns the timer and runs the reopen loop.
//! Closing the stale port and holding the request gate during recovery is
//! the transport's job, so no request can reach a half-closed handle.

use crate::port::PortError;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    Idle,
    Armed,
    Recovering,
}

/// How hard to try when reopening a stalled port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Sleep between failed attempts.
    pub backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    policy: ReconnectPolicy,
    state: Mutex<WatchdogState>,
}

impl Watchdog {
    pub fn new(timeout: Duration, policy: ReconnectPolicy) -> Self {
        Self {
            timeout,
            policy,
            state: Mutex::new(WatchdogState::Idle),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> WatchdogState {
        *self.state.lock()
    }

    /// A request was sent.
    pub fn arm(&self) {
        *self.state.lock() = WatchdogState::Armed;
    }

    /// The request completed (frame, read error or cancellation).
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        if *state == WatchdogState::Armed {
            *state = WatchdogState::Idle;
        }
    }

    /// Resolves when the armed request has run out of time.
    pub async fn expired(&self) {
        tokio::time::sleep(self.timeout).await;
    }

    /// Run `reopen` until it succeeds or the policy gives up, sleeping
    /// `backoff` between attempts. The state is `Recovering` throughout and
    /// `Idle` afterwards, whatever the outcome.
    pub async fn recover<T, F, Fut>(&self, mut reopen: F) -> Result<T, PortError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        *self.state.lock() = WatchdogState::Recovering;
        let result = self.retry(&mut reopen).await;
        *self.state.lock() = WatchdogState::Idle;
        result
    }

    async fn retry<T, F, Fut>(&self, reopen: &mut F) -> Result<T, PortError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match reopen(attempt).await {
                Ok(value) => {
                    info!(attempt, "port reopened");
                    return Ok(value);
                }
                Err(e) if self.policy.exhausted(attempt) => {
                    warn!(attempt, error = %e, "giving up on reopening port");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff = ?self.policy.backoff,
                        "reopen failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}
