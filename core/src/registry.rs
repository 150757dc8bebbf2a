//! Event-type registry: decoders keyed by `(aggregate_type, reason)`.
//!
//! The registry is an explicit value handed to every projection (usually as
//! `Arc<EventRegistry>`), never process-wide state. Two registries can
//! coexist, which keeps tests isolated from each other.
//!
//! # Example
//!
//! ```
//! use eventline_core::event::EventData;
//! use eventline_core::registry::EventRegistry;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
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
//! let mut registry = EventRegistry::new();
//! registry.register::<Born>("Person", "Born");
//! assert!(registry.is_registered("Person", "Born"));
//! assert!(!registry.is_registered("Person", "Died"));
//! ```

use crate::event::{DecodedEvent, Event, EventData, EventError};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Decodes a payload into a type-erased value.
pub type Decoder =
    Arc<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, EventError> + Send + Sync>;

/// Errors raised while resolving or running a decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No decoder is registered for this `(aggregate_type, reason)`.
    ///
    /// A configuration defect rather than a transient failure.
    #[error("event not registered: aggregate type {aggregate_type:?}, reason {reason:?}")]
    NotRegistered {
        /// Aggregate type of the event.
        aggregate_type: String,
        /// Reason of the event.
        reason: String,
    },

    /// The registered decoder rejected the payload bytes.
    #[error(transparent)]
    Decode(#[from] EventError),
}

/// Lookup table of payload decoders.
#[derive(Clone, Default)]
pub struct EventRegistry {
    decoders: HashMap<(String, String), Decoder>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bincode decoder for payload type `T`.
    ///
    /// Registering the same key twice replaces the earlier decoder.
    pub fn register<T>(
        &mut self,
        aggregate_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> &mut Self
    where
        T: EventData + DeserializeOwned,
    {
        self.register_decoder(aggregate_type, reason, |bytes| {
            T::from_bytes(bytes).map(|data| Box::new(data) as Box<dyn Any + Send + Sync>)
        })
    }

    /// Register a custom decoder closure.
    pub fn register_decoder<F>(
        &mut self,
        aggregate_type: impl Into<String>,
        reason: impl Into<String>,
        decoder: F,
    ) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, EventError> + Send + Sync + 'static,
    {
        self.decoders
            .insert((aggregate_type.into(), reason.into()), Arc::new(decoder));
        self
    }

    /// Whether a decoder exists for `(aggregate_type, reason)`.
    #[must_use]
    pub fn is_registered(&self, aggregate_type: &str, reason: &str) -> bool {
        self.decoder(aggregate_type, reason).is_some()
    }

    /// Look up the decoder for `(aggregate_type, reason)`.
    #[must_use]
    pub fn decoder(&self, aggregate_type: &str, reason: &str) -> Option<&Decoder> {
        self.decoders
            .get(&(aggregate_type.to_string(), reason.to_string()))
    }

    /// Decode an event's payload.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotRegistered`] if no decoder matches
    /// - [`RegistryError::Decode`] if the decoder rejects the bytes
    pub fn decode(&self, event: Event) -> Result<DecodedEvent, RegistryError> {
        let decoder = self
            .decoder(&event.aggregate_type, &event.reason)
            .ok_or_else(|| RegistryError::NotRegistered {
                aggregate_type: event.aggregate_type.clone(),
                reason: event.reason.clone(),
            })?;
        let payload = decoder(&event.data)?;
        Ok(DecodedEvent::new(event, payload))
    }

    /// Number of registered decoders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether the registry has no decoders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.decoders.keys().collect();
        keys.sort();
        f.debug_struct("EventRegistry")
            .field("registered", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AggregateId, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Born {
        name: String,
    }

    impl EventData for Born {
        fn reason(&self) -> &'static str {
            "Born"
        }
    }

    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn born_event(name: &str) -> Event {
        Event::from_data(
            AggregateId::new("person-1"),
            "Person",
            Version::new(1),
            &Born {
                name: name.to_string(),
            },
        )
        .expect("serialization should succeed")
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decodes_registered_event() {
        let mut registry = EventRegistry::new();
        registry.register::<Born>("Person", "Born");

        let decoded = registry
            .decode(born_event("kalle"))
            .expect("decoding should succeed");
        assert_eq!(
            decoded.data::<Born>(),
            Some(&Born {
                name: "kalle".to_string()
            })
        );
    }

    #[test]
    fn unregistered_event_is_reported_with_its_key() {
        let registry = EventRegistry::new();
        let err = registry.decode(born_event("kalle")).err();

        assert_eq!(
            err,
            Some(RegistryError::NotRegistered {
                aggregate_type: "Person".to_string(),
                reason: "Born".to_string(),
            })
        );
    }

    #[test]
    fn same_reason_on_other_aggregate_type_is_not_registered() {
        let mut registry = EventRegistry::new();
        registry.register::<Born>("Robot", "Born");

        assert!(matches!(
            registry.decode(born_event("kalle")),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn custom_decoder_errors_surface_as_decode_errors() {
        let mut registry = EventRegistry::new();
        registry.register_decoder("Person", "Born", |_| {
            Err(EventError::Deserialization("bad bytes".to_string()))
        });

        assert!(matches!(
            registry.decode(born_event("kalle")),
            Err(RegistryError::Decode(EventError::Deserialization(_)))
        ));
    }

    #[test]
    fn registries_are_independent() {
        let mut first = EventRegistry::new();
        first.register::<Born>("Person", "Born");
        let second = EventRegistry::new();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(!second.is_registered("Person", "Born"));
    }
}
