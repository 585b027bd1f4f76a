use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Why a context stopped a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("operation cancelled")]
    Cancelled,
}

/// Deadline and cancellation state threaded through every blocking call of a run.
///
/// Contexts form a tree: a child created with [`ProbeContext::with_timeout`]
/// shares its parent's cancellation and never outlives the parent's deadline.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

/// Cancels the context it was created with and every context derived from it.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl ProbeContext {
    /// A root context without deadline, cancellable through the returned handle.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: rx,
            },
            CancelHandle(tx),
        )
    }

    /// A root context that can never be cancelled and has no deadline.
    pub fn background() -> Self {
        let (_, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel: rx,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// The reason this context is already done, if any.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the deadline passes or the context is cancelled.
    pub async fn done(&self) -> ContextError {
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            // A dropped handle can no longer cancel anything.
            let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = cancelled => ContextError::Cancelled,
                _ = sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }

    /// Runs `fut` until it completes or the context is done, whichever comes first.
    pub async fn bound<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            output = fut => Ok(output),
            err = self.done() => Err(err),
        }
    }

    /// Pacing sleep. Ignores the deadline; only cancellation cuts it short.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        let unbounded = Self {
            deadline: None,
            cancel: self.cancel.clone(),
        };
        unbounded.bound(tokio::time::sleep(duration)).await
    }
}
