//! Caller-side cancellation signal.
//!
//! Every capability operation takes a `CancelToken`. Clones observe the same
//! signal; once cancelled a token stays cancelled.

use crate::error::{ArestError, ArestResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// A token that cancels itself after `delay`. Must be called inside a Tokio runtime.
    pub fn with_timeout(delay: Duration) -> Self {
        let token = Self::new();
        let tx = Arc::clone(&token.tx);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send_replace(true);
        });
        token
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Cancelled)` if the signal has fired.
    pub fn check(&self) -> ArestResult<()> {
        if self.is_cancelled() {
            Err(ArestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of this token, so this only
        // fails if it never fires.
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
