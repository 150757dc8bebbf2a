//! Write-side validation of event batches.
//!
//! [`validate_events`] is the gate every append passes through. A writer hands
//! it the aggregate's last committed version together with the candidate
//! batch; the batch is accepted only if it extends that version without gaps
//! and stays within one aggregate. On a [`ValidationError::Concurrency`] the
//! writer must re-read the aggregate and retry the whole batch. Nothing here
//! retries.

use crate::event::Event;
use crate::stream::{AggregateId, Version};
use thiserror::Error;

/// Why a batch of events was rejected.
///
/// Callers branch on the variant, never on the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An event belongs to a different aggregate than the one being written.
    #[error("events holds events for more than one aggregate: expected {expected}, found {found}")]
    MultipleAggregates {
        /// Aggregate the batch is written to.
        expected: AggregateId,
        /// Aggregate of the offending event.
        found: AggregateId,
    },

    /// An event has a different aggregate type than the first event.
    #[error(
        "events holds events for more than one aggregate type: expected {expected}, found {found}"
    )]
    MultipleAggregateTypes {
        /// Aggregate type of the first event in the batch.
        expected: String,
        /// Aggregate type of the offending event.
        found: String,
    },

    /// An event version does not directly follow the previous one.
    #[error("concurrency error: expected version {expected}, found {found}")]
    Concurrency {
        /// The version the event had to carry.
        expected: Version,
        /// The version it carried.
        found: Version,
    },

    /// An event has an empty reason.
    #[error("event holds no reason (version {version})")]
    ReasonMissing {
        /// Version of the offending event.
        version: Version,
    },
}

/// Validate a batch of candidate events against the aggregate's current version.
///
/// Checks every event in order, in this precedence:
///
/// 1. `aggregate_id` matches the aggregate being written
/// 2. `aggregate_type` matches the first event's
/// 3. `version` is exactly one past the previous version
/// 4. `reason` is non-empty
///
/// An empty batch is accepted; appending nothing cannot lose an update.
///
/// # Errors
///
/// Returns the [`ValidationError`] for the first event that fails a check.
///
/// # Examples
///
/// ```
/// use eventline_core::event::Event;
/// use eventline_core::stream::{AggregateId, Version};
/// use eventline_core::validation::{validate_events, ValidationError};
///
/// let id = AggregateId::new("person-1");
/// let events = vec![
///     Event::new(id.clone(), "Person", Version::new(3), "AgedOneYear", vec![]),
///     Event::new(id.clone(), "Person", Version::new(4), "AgedOneYear", vec![]),
/// ];
///
/// assert!(validate_events(&id, Version::new(2), &events).is_ok());
/// assert!(matches!(
///     validate_events(&id, Version::new(3), &events),
///     Err(ValidationError::Concurrency { .. })
/// ));
/// ```
pub fn validate_events(
    aggregate_id: &AggregateId,
    current_version: Version,
    events: &[Event],
) -> Result<(), ValidationError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    let aggregate_type = first.aggregate_type.as_str();
    let mut current = current_version;

    for event in events {
        if event.aggregate_id != *aggregate_id {
            return Err(ValidationError::MultipleAggregates {
                expected: aggregate_id.clone(),
                found: event.aggregate_id.clone(),
            });
        }

        if event.aggregate_type != aggregate_type {
            return Err(ValidationError::MultipleAggregateTypes {
                expected: aggregate_type.to_string(),
                found: event.aggregate_type.clone(),
            });
        }

        if event.version != current.next() {
            return Err(ValidationError::Concurrency {
                expected: current.next(),
                found: event.version,
            });
        }

        if event.reason.is_empty() {
            return Err(ValidationError::ReasonMissing {
                version: event.version,
            });
        }

        current = event.version;
    }

    Ok(())
}
