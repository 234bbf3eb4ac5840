//! Call context carrying the caller's deadline and cancellation signal.
//!
//! Every fetch and apply call receives a [`CallContext`]. Contexts are cheap to
//! clone; children share the parent's cancellation signal and may only
//! tighten its deadline.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Result, WaitError};

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The cancellation signal fired.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

/// Deadline and cancellation for one logical operation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Handle that cancels every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CallContext {
    /// A context that never finishes on its own.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A root context together with the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(receiver),
            },
            CancelHandle { sender },
        )
    }

    /// Derives a context that finishes after `timeout` at the latest.
    ///
    /// A timeout too large to represent as an instant adds no bound; the
    /// parent's deadline, if any, still applies.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derives a context that finishes at `deadline` at the latest.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// The effective deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context has finished, or `None` while it is live.
    #[must_use]
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context finishes. Never resolves for a background context.
    pub async fn done(&self) -> DoneReason {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            let Some(rx) = cancel.as_mut() else {
                return std::future::pending::<()>().await;
            };
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Handle dropped without cancelling: the signal can never fire.
                    return std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            biased;
            () = cancelled => DoneReason::Cancelled,
            () = expired => DoneReason::DeadlineExceeded,
        }
    }

    /// Runs `fut` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns a cancellation-class [`WaitError`] naming `operation` when the
    /// context finishes before `fut` completes.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(reason) = self.done_reason() {
            return Err(reason.into_error(operation, 0, None).into());
        }
        tokio::select! {
            biased;
            result = fut => result,
            reason = self.done() => Err(reason.into_error(operation, 0, None).into()),
        }
    }
}

impl DoneReason {
    /// Converts the reason into the matching wait error.
    #[must_use]
    pub fn into_error(self, operation: &str, attempts: u32, last_error: Option<String>) -> WaitError {
        match self {
            Self::Cancelled => WaitError::Cancelled {
                operation: operation.to_string(),
                attempts,
            },
            Self::DeadlineExceeded => WaitError::DeadlineExceeded {
                operation: operation.to_string(),
                attempts,
                last_error,
            },
        }
    }
}

impl CancelHandle {
    /// Cancels every context sharing this handle's signal.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}
