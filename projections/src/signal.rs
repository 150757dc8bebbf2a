//! Cancellation signal with an optional deadline.
//!
//! A [`CancelSignal`] stops projection runs cooperatively. It fires either
//! when [`cancel`](CancelSignal::cancel) is called (on it or on a parent) or
//! when its deadline passes, and reports which of the two happened:
//! [`ProjectionError::Canceled`] or [`ProjectionError::DeadlineExceeded`].
//!
//! Runs only look at the signal between passes, so a callback in progress
//! always completes.
//!
//! # Example
//!
//! ```
//! use eventline_projections::CancelSignal;
//! use std::time::Duration;
//!
//! let root = CancelSignal::new();
//! let child = root.child().with_timeout(Duration::from_secs(1));
//!
//! root.cancel();
//! assert!(child.is_done());
//! ```

use crate::error::ProjectionError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation signal shared by projection runs.
///
/// Cloning yields a handle to the same signal. [`child`](Self::child) yields
/// a signal that fires with its parent but can also be fired on its own.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Create a signal without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the signal a deadline `timeout` from now.
    ///
    /// An earlier existing deadline is kept. A timeout too large to
    /// represent as an instant leaves the deadline unchanged.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Give the signal an absolute deadline.
    ///
    /// An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Create a child signal that fires when this one fires.
    ///
    /// Canceling the child leaves the parent untouched. The child inherits
    /// the parent's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Fire the signal. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if one is set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the signal has fired or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Return the reason the signal is done, or `Ok(())` if it is not.
    ///
    /// An explicit cancel takes precedence over an elapsed deadline.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Canceled`] or [`ProjectionError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), ProjectionError> {
        if self.token.is_cancelled() {
            return Err(ProjectionError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ProjectionError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Wait until the signal is done and return why.
    pub async fn done(&self) -> ProjectionError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => ProjectionError::Canceled,
                    () = tokio::time::sleep_until(deadline) => ProjectionError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ProjectionError::Canceled
            }
        }
    }
}

/// Fires a signal when dropped, including during a panic unwind.
#[derive(Debug)]
pub(crate) struct CancelOnDrop(pub(crate) CancelSignal);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
