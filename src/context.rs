//! Caller context: cancellation plus an optional deadline.
//!
//! Every suspension point in the crate (slot wait, processor run, fallback
//! dispatch, retry backoff, HTTP attempt) races `CallContext::done` and
//! returns promptly when it fires.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Cancelled,
    DeadlineExceeded,
}

impl DoneReason {
    /// Convert into the matching error for `target` at `stage`.
    pub fn into_error(self, target: &str, stage: &'static str) -> ResilienceError {
        match self {
            DoneReason::Cancelled => ResilienceError::Cancelled {
                target: target.to_string(),
                stage,
            },
            DoneReason::DeadlineExceeded => ResilienceError::DeadlineExceeded {
                target: target.to_string(),
                stage,
            },
        }
    }
}

/// Cancellable deadline owned by the caller for the duration of one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline that is only done when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    /// Attach an existing cancellation token (e.g. a request-scoped one).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Tighten the deadline to `timeout` from now. Never extends it.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` if unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Non-blocking check.
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.cancellation.is_cancelled() {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancellation.cancelled() => DoneReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DoneReason::DeadlineExceeded,
            },
            None => {
                self.cancellation.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        assert!(ctx.done_reason().is_none());
        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert_eq!(ctx.done_reason(), Some(DoneReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_wins() {
        let ctx = CallContext::with_timeout(Duration::from_secs(60));
        let child = ctx.clone();
        tokio::spawn(async move { child.cancel() });
        assert_eq!(ctx.done().await, DoneReason::Cancelled);
    }

    #[test]
    fn test_deadline_only_tightens() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let before = ctx.deadline().unwrap();
        let ctx = ctx.deadline_in(Duration::from_secs(10));
        assert_eq!(ctx.deadline().unwrap(), before);
    }
}
