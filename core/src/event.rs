//! Event record, payload trait and decoded view.
//!
//! An [`Event`] is an immutable fact owned by the event store once appended.
//! Its payload travels as bytes (`data`) and is only decoded when a projection
//! asks the [`EventRegistry`](crate::registry::EventRegistry) for a decoder
//! keyed by `(aggregate_type, reason)`. The core never needs compile-time
//! knowledge of concrete payload shapes.
//!
//! # Design
//!
//! Payloads are serialized with `bincode` by default, keeping the stored form
//! compact and fast to decode. Hosts that need another codec register a custom
//! decoder instead.
//!
//! # Example
//!
//! ```
//! use eventline_core::event::{Event, EventData};
//! use eventline_core::stream::{AggregateId, Version};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Born {
//!     name: String,
//! }
//!
//! impl EventData for Born {
//!     fn reason(&self) -> &'static str {
//!         "Born"
//!     }
//! }
//!
//! let event = Event::from_data(
//!     AggregateId::new("person-1"),
//!     "Person",
//!     Version::new(1),
//!     &Born { name: "kalle".into() },
//! )
//! .unwrap();
//!
//! assert_eq!(event.reason, "Born");
//! ```

use crate::stream::{AggregateId, GlobalVersion, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Error types for payload encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize a payload to bytes.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize a payload from bytes.
    #[error("Failed to deserialize event: {0}")]
    Deserialization(String),

    /// The decoded payload did not have the type the decoder promised.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Free-form metadata attached to an event.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A payload type that can be carried in an [`Event`].
///
/// # Reason
///
/// `reason()` names the payload's logical type. Together with the aggregate
/// type it selects the decoder used on replay, so it must be stable across
/// releases and never empty (the write path rejects empty reasons).
///
/// # Serialization
///
/// The default methods use `bincode`, matching the decoder installed by
/// [`EventRegistry::register`](crate::registry::EventRegistry::register).
pub trait EventData: Send + Sync + 'static {
    /// Returns the reason (logical type name) of this payload.
    fn reason(&self) -> &'static str;

    /// Serialize this payload to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize a payload from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the bytes are corrupt or were
    /// written for a different payload type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

/// An event as stored in, and read back from, the event log.
///
/// Within one append batch all events share `aggregate_id` and
/// `aggregate_type`, and their versions run `current + 1 ..= current + n`
/// without gaps (see [`validate_events`](crate::validation::validate_events)).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identity of the aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// Per-aggregate sequence number, starting at 1.
    pub version: Version,

    /// Store-wide position; [`GlobalVersion::UNASSIGNED`] until stored.
    pub global_version: GlobalVersion,

    /// Logical type of the payload.
    pub reason: String,

    /// Type name of the aggregate.
    pub aggregate_type: String,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// Serialized payload.
    pub data: Vec<u8>,

    /// Optional metadata (correlation ids, user ids, ...).
    pub metadata: Metadata,
}

impl Event {
    /// Create an event from already-serialized payload bytes.
    #[must_use]
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        reason: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            aggregate_id,
            version,
            global_version: GlobalVersion::UNASSIGNED,
            reason: reason.into(),
            aggregate_type: aggregate_type.into(),
            timestamp: Utc::now(),
            data,
            metadata: Metadata::new(),
        }
    }

    /// Create an event from a typed payload, taking the reason from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be serialized.
    pub fn from_data<D: EventData + Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        data: &D,
    ) -> Result<Self, EventError> {
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            version,
            data.reason(),
            data.to_bytes()?,
        ))
    }

    /// Attach metadata to the event.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event {{ {}/{} v{} (global {}): {}, {} bytes }}",
            self.aggregate_type,
            self.aggregate_id,
            self.version,
            self.global_version,
            self.reason,
            self.data.len()
        )
    }
}

/// An event together with its decoded payload.
///
/// This is what projection callbacks receive. The payload is type-erased;
/// callbacks branch on it with [`DecodedEvent::data`].
pub struct DecodedEvent {
    event: Event,
    payload: Box<dyn Any + Send + Sync>,
}

impl DecodedEvent {
    /// Pair an event with its decoded payload.
    #[must_use]
    pub fn new(event: Event, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self { event, payload }
    }

    /// The stored event.
    #[must_use]
    pub const fn event(&self) -> &Event {
        &self.event
    }

    /// The decoded payload, if it is a `T`.
    #[must_use]
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Store-wide position of the event.
    #[must_use]
    pub const fn global_version(&self) -> GlobalVersion {
        self.event.global_version
    }

    /// Consume the decoded view and return the stored event.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }
}

impl fmt::Debug for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedEvent")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Renamed {
        name: String,
    }

    impl EventData for Renamed {
        fn reason(&self) -> &'static str {
            "Renamed"
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn from_data_takes_reason_from_payload() {
        let event = Event::from_data(
            AggregateId::new("person-1"),
            "Person",
            Version::new(3),
            &Renamed {
                name: "anka".to_string(),
            },
        )
        .expect("serialization should succeed");

        assert_eq!(event.reason, "Renamed");
        assert_eq!(event.aggregate_type, "Person");
        assert_eq!(event.version, Version::new(3));
        assert_eq!(event.global_version, GlobalVersion::UNASSIGNED);
        assert!(event.metadata.is_empty());

        let decoded = Renamed::from_bytes(&event.data).expect("deserialization should succeed");
        assert_eq!(decoded.name, "anka");
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        let result = Renamed::from_bytes(&[0xff]);
        assert!(matches!(result, Err(EventError::Deserialization(_))));
    }

    #[test]
    fn decoded_event_downcasts_to_payload_type() {
        let event = Event::new(
            AggregateId::new("person-1"),
            "Person",
            Version::new(1),
            "Renamed",
            vec![],
        );
        let decoded = DecodedEvent::new(
            event,
            Box::new(Renamed {
                name: "kalle".to_string(),
            }),
        );

        assert_eq!(
            decoded.data::<Renamed>().map(|r| r.name.as_str()),
            Some("kalle")
        );
        assert!(decoded.data::<String>().is_none());
    }

    #[test]
    fn metadata_is_attached() {
        let mut metadata = Metadata::new();
        metadata.insert("foo".to_string(), serde_json::json!("bar"));

        let event = Event::new(
            AggregateId::new("person-1"),
            "Person",
            Version::new(1),
            "Born",
            vec![],
        )
        .with_metadata(metadata);

        assert_eq!(event.metadata.get("foo"), Some(&serde_json::json!("bar")));
    }

    #[test]
    fn display_mentions_reason_and_positions() {
        let event = Event::new(
            AggregateId::new("person-1"),
            "Person",
            Version::new(2),
            "AgedOneYear",
            vec![1, 2, 3],
        );
        let display = format!("{event}");
        assert!(display.contains("AgedOneYear"));
        assert!(display.contains("v2"));
        assert!(display.contains("3 bytes"));
    }
}
