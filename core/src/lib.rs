//! # Eventline Core
//!
//! Core types for the Eventline event-sourcing runtime.
//!
//! This crate holds everything the write side and the projection engine share:
//!
//! - **Event**: immutable fact with a per-aggregate [`Version`](stream::Version)
//!   and a store-wide [`GlobalVersion`](stream::GlobalVersion)
//! - **Validation**: the optimistic-concurrency gate every append passes
//! - **Registry**: decoders for event payloads, keyed by aggregate type and reason
//! - **Event store traits**: the read/write interfaces concrete backends implement
//!
//! ## Data flow
//!
//! ```text
//! writer → validate_events → EventStore (external) → Projection(s) → read model
//! ```
//!
//! ## Example
//!
//! ```
//! use eventline_core::event::Event;
//! use eventline_core::stream::{AggregateId, Version};
//! use eventline_core::validation::validate_events;
//!
//! let id = AggregateId::new("person-1");
//! let batch = vec![Event::new(id.clone(), "Person", Version::new(1), "Born", vec![])];
//!
//! validate_events(&id, Version::INITIAL, &batch).unwrap();
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Event record, payload trait and decoded view
pub mod event;

/// Event source and event store abstractions
pub mod event_store;

/// Decoder registry keyed by aggregate type and reason
pub mod registry;

/// Aggregate identity and version newtypes
pub mod stream;

/// Write-side batch validation
pub mod validation;

pub use event::{DecodedEvent, Event, EventData, EventError, Metadata};
pub use event_store::{EventSource, EventStore, EventStoreError, StoreFuture};
pub use registry::{EventRegistry, RegistryError};
pub use stream::{AggregateId, GlobalVersion, Version};
pub use validation::{ValidationError, validate_events};
