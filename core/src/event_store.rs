//! Event source and event store abstractions.
//!
//! The runtime never stores events itself. It consumes two traits:
//!
//! - [`EventSource`]: the read side. Projections pull ordered batches from it,
//!   starting at an explicit [`GlobalVersion`] cursor they hold themselves.
//! - [`EventStore`]: the write side. Appends must pass
//!   [`validate_events`](crate::validation::validate_events) against the
//!   aggregate's last committed version and are rejected atomically otherwise.
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `eventline-testing`): fast, deterministic store
//!   for tests and embedding
//!
//! # Dyn Compatibility
//!
//! Both traits return `Pin<Box<dyn Future>>` instead of using `async fn` so
//! they can be shared as `Arc<dyn EventSource>` by many projections.

use crate::event::Event;
use crate::stream::{AggregateId, GlobalVersion, Version};
use crate::validation::ValidationError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The batch failed write-side validation; nothing was appended.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend storage error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EventStoreError {
    /// Whether the error is an optimistic-concurrency conflict.
    ///
    /// The writer should re-read the aggregate and retry the whole batch.
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::Concurrency { .. }))
    }
}

/// Boxed future returned by the store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Ordered, resumable read access to the global event log.
///
/// # Contract
///
/// - Events come back in ascending [`GlobalVersion`] order, without gaps
///   relative to `from`.
/// - A call returns fewer than `max` events (possibly zero) when no more are
///   currently available. That does not end the log: a later call may yield
///   more.
/// - Must be safe for many concurrent readers.
pub trait EventSource: Send + Sync {
    /// Read up to `max` events whose global version is `>= from`.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] if the backend cannot be read.
    fn read_from(&self, from: GlobalVersion, max: usize) -> StoreFuture<'_, Vec<Event>>;
}

/// Append and per-aggregate load on top of [`EventSource`].
pub trait EventStore: EventSource {
    /// Append a batch for one aggregate.
    ///
    /// The batch is validated against the aggregate's last committed version
    /// and either stored completely or not at all. Returns the stored events
    /// with their global versions assigned.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Validation`]: the batch was rejected
    /// - [`EventStoreError::DatabaseError`]: the backend failed
    fn save(&self, events: Vec<Event>) -> StoreFuture<'_, Vec<Event>>;

    /// Load the events of one aggregate with a version greater than `after`.
    ///
    /// Unknown aggregates yield an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] if the backend cannot be read.
    fn load(&self, aggregate_id: &AggregateId, after: Version) -> StoreFuture<'_, Vec<Event>>;

    /// Current version of an aggregate ([`Version::INITIAL`] if unknown).
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] if the backend cannot be read.
    fn current_version(&self, aggregate_id: &AggregateId) -> StoreFuture<'_, Version>;
}
