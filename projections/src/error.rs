//! Error type shared by projections, groups and races.

use eventline_core::{EventStoreError, RegistryError};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Opaque error returned by a projection callback.
///
/// Kept behind an `Arc` so one failure can be reported both as a race cause
/// and as the failing participant's result.
pub type CallbackError = Arc<dyn StdError + Send + Sync>;

/// Error type for projection operations.
///
/// Every kind is a distinct variant so callers branch on the category, never
/// on the message.
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// No decoder is registered for the event's `(aggregate_type, reason)`.
    #[error("event not registered: aggregate type {aggregate_type:?}, reason {reason:?}")]
    EventNotRegistered {
        /// Aggregate type of the event.
        aggregate_type: String,
        /// Reason of the event.
        reason: String,
    },

    /// A registered decoder rejected the payload.
    #[error("Failed to decode event payload: {0}")]
    Decode(String),

    /// The application callback failed; the host error is kept verbatim.
    #[error(transparent)]
    Callback(CallbackError),

    /// Another run is already in flight on this projection.
    #[error("projection is already running")]
    AlreadyRunning,

    /// The cancellation signal was fired.
    #[error("projection run canceled")]
    Canceled,

    /// The cancellation signal's deadline elapsed.
    #[error("projection run deadline exceeded")]
    DeadlineExceeded,

    /// The event source failed.
    #[error("Event source error: {0}")]
    Source(#[from] EventStoreError),

    /// The projection group is not running.
    #[error("projection group is not running")]
    NotRunning,

    /// A projection task ended abnormally (panicked or was aborted).
    #[error("projection task failed: {0}")]
    TaskFailed(String),
}

impl ProjectionError {
    /// Wrap a host error returned from a callback.
    pub fn callback<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(error))
    }

    /// The host error, if this is a callback failure of type `E`.
    #[must_use]
    pub fn callback_error<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Callback(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Whether the run stopped because its signal fired or its deadline passed.
    ///
    /// This is normal termination, not a logic failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

impl From<RegistryError> for ProjectionError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotRegistered {
                aggregate_type,
                reason,
            } => Self::EventNotRegistered {
                aggregate_type,
                reason,
            },
            RegistryError::Decode(e) => Self::Decode(e.to_string()),
        }
    }
}

impl From<Box<dyn StdError + Send + Sync>> for ProjectionError {
    fn from(error: Box<dyn StdError + Send + Sync>) -> Self {
        Self::Callback(Arc::from(error))
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("application error")]
    struct ApplicationError;

    #[test]
    fn callback_error_is_downcastable() {
        let error = ProjectionError::callback(ApplicationError);
        assert!(error.callback_error::<ApplicationError>().is_some());
        assert_eq!(error.to_string(), "application error");
    }

    #[test]
    fn non_callback_errors_do_not_downcast() {
        assert!(
            ProjectionError::Canceled
                .callback_error::<ApplicationError>()
                .is_none()
        );
    }

    #[test]
    fn cancellation_kinds() {
        assert!(ProjectionError::Canceled.is_cancellation());
        assert!(ProjectionError::DeadlineExceeded.is_cancellation());
        assert!(!ProjectionError::AlreadyRunning.is_cancellation());
    }

    #[test]
    fn registry_errors_map_to_registration_kind() {
        let error: ProjectionError = RegistryError::NotRegistered {
            aggregate_type: "Person".to_string(),
            reason: "Born".to_string(),
        }
        .into();

        assert!(matches!(
            error,
            ProjectionError::EventNotRegistered { ref reason, .. } if reason == "Born"
        ));
    }
}
