//! Aggregate identity and version types.
//!
//! Three newtypes carry the ordering guarantees of the event log:
//!
//! - [`AggregateId`]: identity of a consistency boundary
//! - [`Version`]: per-aggregate sequence number, checked on every write
//! - [`GlobalVersion`]: store-wide total order, the only legitimate replay cursor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `AggregateId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid aggregate ID: {0}")]
pub struct ParseAggregateIdError(String);

/// Identity of an aggregate (the consistency boundary events are appended to).
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `From::from()` and `new()`: no validation (trusted, application-controlled input)
///
/// # Examples
///
/// ```
/// use eventline_core::stream::AggregateId;
///
/// let id = AggregateId::new("person-1");
/// assert_eq!(id.as_str(), "person-1");
///
/// let parsed: AggregateId = "person-2".parse().unwrap();
/// assert_eq!(parsed, AggregateId::new("person-2"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create a new `AggregateId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the aggregate ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `AggregateId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAggregateIdError(
                "Aggregate ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AggregateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AggregateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-aggregate version number used for optimistic concurrency control.
///
/// An aggregate with no events is at [`Version::INITIAL`] (0). Its first event
/// carries version 1 and every following event increments by exactly one.
/// A writer states the version it last observed; the batch is rejected if the
/// store has moved on since.
///
/// # Examples
///
/// ```
/// use eventline_core::stream::Version;
///
/// let v0 = Version::INITIAL;
/// assert_eq!(v0.next(), Version::new(1));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of an aggregate that has no events yet.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// Saturates at `u64::MAX`, which no real aggregate reaches.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Check if this is the initial version (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

/// Position of an event in the store-wide total order.
///
/// Global versions start at [`GlobalVersion::FIRST`] and increase by one for
/// every event the store accepts, across all aggregates. Projections use a
/// global version as their cursor: the value they hold is the *next* global
/// version to read, so a fresh projection starts at `FIRST` and a projection
/// that has handled event `n` holds `n + 1`.
///
/// `GlobalVersion::UNASSIGNED` (0) marks an event that has not been stored yet.
///
/// # Examples
///
/// ```
/// use eventline_core::stream::GlobalVersion;
///
/// let cursor = GlobalVersion::FIRST;
/// assert_eq!(cursor.value(), 1);
/// assert_eq!(cursor.next(), GlobalVersion::new(2));
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GlobalVersion(u64);

impl GlobalVersion {
    /// Global version of an event the store has not assigned a position to.
    pub const UNASSIGNED: Self = Self(0);

    /// Global version of the first event ever stored.
    pub const FIRST: Self = Self(1);

    /// Create a new `GlobalVersion` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the global version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the following global version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Whether the store has assigned this position.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for GlobalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<GlobalVersion> for u64 {
    fn from(version: GlobalVersion) -> Self {
        version.0
    }
}
