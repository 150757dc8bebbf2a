//! `Person` aggregate used across the test suites.
//!
//! A person is `Born` with a name and then `AgedOneYear` any number of times.

use eventline_core::{
    AggregateId, DecodedEvent, Event, EventData, EventError, EventRegistry, EventStore,
    EventStoreError, Metadata, Version,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate type of every fixture event.
pub const PERSON: &str = "Person";

static NEXT_PERSON: AtomicU64 = AtomicU64::new(1);

/// First event of every person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Born {
    /// The person's name.
    pub name: String,
}

impl EventData for Born {
    fn reason(&self) -> &'static str {
        "Born"
    }
}

/// The person had a birthday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgedOneYear;

impl EventData for AgedOneYear {
    fn reason(&self) -> &'static str {
        "AgedOneYear"
    }
}

/// Read model of one person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    /// Name from `Born`.
    pub name: String,
    /// Number of `AgedOneYear` events seen.
    pub age: u32,
}

impl Person {
    /// Apply one decoded event.
    pub fn apply(&mut self, event: &DecodedEvent) {
        if let Some(born) = event.data::<Born>() {
            self.name.clone_from(&born.name);
            self.age = 0;
        } else if event.data::<AgedOneYear>().is_some() {
            self.age += 1;
        }
    }
}

/// Registry with decoders for `Born` and `AgedOneYear`.
#[must_use]
pub fn person_registry() -> EventRegistry {
    let mut registry = EventRegistry::new();
    registry
        .register::<Born>(PERSON, "Born")
        .register::<AgedOneYear>(PERSON, "AgedOneYear");
    registry
}

/// Events for a new person: one `Born` plus `age` × `AgedOneYear`.
///
/// Each call uses a fresh aggregate id, so the batch always validates
/// against an empty stream. Birthdays carry `{"foo": "bar"}` metadata.
///
/// # Errors
///
/// Returns [`EventError::Serialization`] if a payload cannot be encoded.
pub fn person_events(name: &str, age: u32) -> Result<Vec<Event>, EventError> {
    let id = AggregateId::new(format!(
        "{name}-{}",
        NEXT_PERSON.fetch_add(1, Ordering::Relaxed)
    ));
    let mut metadata = Metadata::new();
    metadata.insert("foo".to_string(), serde_json::Value::from("bar"));

    let mut events = Vec::with_capacity(age as usize + 1);
    events.push(Event::from_data(
        id.clone(),
        PERSON,
        Version::new(1),
        &Born {
            name: name.to_string(),
        },
    )?);
    for version in 2..=u64::from(age) + 1 {
        events.push(
            Event::from_data(id.clone(), PERSON, Version::new(version), &AgedOneYear)?
                .with_metadata(metadata.clone()),
        );
    }
    Ok(events)
}

/// Save a new person with `age` birthdays and return the stored events.
///
/// # Errors
///
/// Returns [`EventStoreError`] if encoding or saving fails.
pub async fn create_person(
    store: &dyn EventStore,
    name: &str,
    age: u32,
) -> Result<Vec<Event>, EventStoreError> {
    let events = person_events(name, age)
        .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
    store.save(events).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn person_events_have_consecutive_versions() {
        let events = person_events("kalle", 3).unwrap();
        let versions: Vec<u64> = events.iter().map(|e| e.version.value()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(events[0].reason, "Born");
        assert!(events[1].metadata.contains_key("foo"));
    }

    #[test]
    fn replay_builds_person() {
        let registry = person_registry();
        let mut person = Person::default();
        for event in person_events("anka", 2).unwrap() {
            person.apply(&registry.decode(event).unwrap());
        }
        assert_eq!(
            person,
            Person {
                name: "anka".to_string(),
                age: 2
            }
        );
    }
}
