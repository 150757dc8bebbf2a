//! In-memory event store for fast, deterministic tests.

use eventline_core::{
    AggregateId, Event, EventSource, EventStore, EventStoreError, GlobalVersion, StoreFuture,
    Version, validate_events,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Log {
    /// All events; the event at index `i` has global version `i + 1`.
    events: Vec<Event>,
    /// Last committed version per aggregate.
    versions: HashMap<AggregateId, Version>,
}

/// In-memory [`EventStore`] backed by a single vector.
///
/// `save` validates each batch with [`validate_events`] against the
/// aggregate's last committed version and assigns global versions
/// atomically under one write lock, so readers never observe a partial
/// batch.
///
/// # Example
///
/// ```
/// use eventline_core::{EventSource, EventStore, GlobalVersion};
/// use eventline_testing::{InMemoryEventStore, person_events};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
/// store.save(person_events("kalle", 1)?).await?;
///
/// let events = store.read_from(GlobalVersion::FIRST, 10).await?;
/// assert_eq!(events.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, EventStoreError> {
        Ok(self.read()?.events.len())
    }

    /// Whether the store holds no events.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, EventStoreError> {
        Ok(self.read()?.events.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Log>, EventStoreError> {
        self.log
            .read()
            .map_err(|e| EventStoreError::DatabaseError(format!("Lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Log>, EventStoreError> {
        self.log
            .write()
            .map_err(|e| EventStoreError::DatabaseError(format!("Lock poisoned: {e}")))
    }

    fn append(&self, mut events: Vec<Event>) -> Result<Vec<Event>, EventStoreError> {
        let Some(aggregate_id) = events.first().map(|e| e.aggregate_id.clone()) else {
            return Ok(events);
        };

        let mut log = self.write()?;
        let current = log
            .versions
            .get(&aggregate_id)
            .copied()
            .unwrap_or(Version::INITIAL);
        validate_events(&aggregate_id, current, &events)?;

        let mut next = log.events.len() as u64 + 1;
        for event in &mut events {
            event.global_version = GlobalVersion::new(next);
            next += 1;
        }
        if let Some(last) = events.last() {
            log.versions.insert(aggregate_id, last.version);
        }
        log.events.extend(events.iter().cloned());
        Ok(events)
    }
}

impl EventSource for InMemoryEventStore {
    fn read_from(
        &self,
        from: GlobalVersion,
        max: usize,
    ) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let log = self.read()?;
            let start = usize::try_from(from.value().saturating_sub(1)).unwrap_or(usize::MAX);
            Ok(log.events.iter().skip(start).take(max).cloned().collect())
        })
    }
}

impl EventStore for InMemoryEventStore {
    fn save(&self, events: Vec<Event>) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { self.append(events) })
    }

    fn load(
        &self,
        aggregate_id: &AggregateId,
        after: Version,
    ) -> StoreFuture<'_, Vec<Event>> {
        let aggregate_id = aggregate_id.clone();
        Box::pin(async move {
            let log = self.read()?;
            Ok(log
                .events
                .iter()
                .filter(|e| e.aggregate_id == aggregate_id && e.version > after)
                .cloned()
                .collect())
        })
    }

    fn current_version(
        &self,
        aggregate_id: &AggregateId,
    ) -> StoreFuture<'_, Version> {
        let aggregate_id = aggregate_id.clone();
        Box::pin(async move {
            let log = self.read()?;
            Ok(log
                .versions
                .get(&aggregate_id)
                .copied()
                .unwrap_or(Version::INITIAL))
        })
    }
}
