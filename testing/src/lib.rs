//! # Eventline Testing
//!
//! Testing utilities for the Eventline event-sourcing runtime.
//!
//! This crate provides:
//! - [`InMemoryEventStore`]: a validating, in-memory [`EventStore`]
//! - The `Person` fixture aggregate (`Born`, `AgedOneYear`) with its registry
//! - [`init_test_tracing`] to route `tracing` output through the test harness
//!
//! ## Example
//!
//! ```ignore
//! use eventline_testing::{InMemoryEventStore, create_person, person_registry};
//!
//! #[tokio::test]
//! async fn test_projection() {
//!     let store = Arc::new(InMemoryEventStore::new());
//!     create_person(store.as_ref(), "kalle", 1).await.unwrap();
//!     let registry = Arc::new(person_registry());
//!     // build projections over `store`
//! }
//! ```
//!
//! [`EventStore`]: eventline_core::EventStore

pub mod fixtures;
pub mod mocks;

pub use fixtures::{AgedOneYear, Born, PERSON, Person, create_person, person_events, person_registry};
pub use mocks::InMemoryEventStore;

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test; only the first call
/// installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
