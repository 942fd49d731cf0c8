//! Per-call cancellation and deadline.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;

/// Why a call stopped waiting for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The caller cancelled.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl Interruption {
    /// Turn the interruption into the adapter error for `method`.
    pub fn into_error(self, method: &str) -> AdapterError {
        let method = method.to_owned();
        match self {
            Self::Cancelled => AdapterError::Cancelled { method },
            Self::DeadlineExceeded => AdapterError::DeadlineExceeded { method },
        }
    }
}

/// Cancellation handle and optional deadline attached to one front request.
///
/// Cloning shares the cancellation token: cancelling any clone cancels all
/// of them.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context driven by an externally owned cancellation token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Copy of this context with a deadline no later than `now + timeout`.
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        let fallback = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(fallback, |d| d.min(fallback))),
        }
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context is already interrupted.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Interruption::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                Interruption::Cancelled
            }
        }
    }
}
