//! Configuration for projections, groups and races.
//!
//! # Example
//!
//! ```
//! use eventline_projections::config::{GroupConfig, ProjectionConfig};
//! use std::time::Duration;
//!
//! let projection = ProjectionConfig::default().with_batch_size(1);
//! let group = GroupConfig::default()
//!     .with_poll_interval(Duration::from_millis(500))
//!     .with_error_channel_capacity(8);
//!
//! assert_eq!(projection.batch_size, 1);
//! assert_eq!(group.error_channel_capacity, 8);
//! ```

use eventline_core::GlobalVersion;
use std::time::Duration;

/// Default number of events pulled per pass.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default wait between passes when a projection is idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default capacity of a group's error channel.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 64;

/// Per-projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionConfig {
    /// Maximum events pulled from the source in one pass (at least 1).
    pub batch_size: usize,
    /// Global version the projection starts reading at.
    pub start: GlobalVersion,
}

impl ProjectionConfig {
    /// Set the batch size. Zero is raised to one.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }

    /// Set the starting global version (resume position).
    #[must_use]
    pub const fn with_start(mut self, start: GlobalVersion) -> Self {
        self.start = start;
        self
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            start: GlobalVersion::FIRST,
        }
    }
}

/// Settings for a [`ProjectionGroup`](crate::ProjectionGroup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    /// Wait between passes when no trigger arrives.
    pub poll_interval: Duration,
    /// Capacity of the error channel. Reports beyond it are dropped.
    pub error_channel_capacity: usize,
}

impl GroupConfig {
    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the error channel capacity. Zero is raised to one.
    #[must_use]
    pub const fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
        }
    }
}

/// Settings for a [`ProjectionRace`](crate::ProjectionRace).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceConfig {
    /// Wait between passes when idle (ignored when `stop_at_no_work` is set).
    pub poll_interval: Duration,
    /// Treat an empty batch as a clean finish instead of idling.
    pub stop_at_no_work: bool,
}

impl RaceConfig {
    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set whether an empty batch ends a participant.
    #[must_use]
    pub const fn with_stop_at_no_work(mut self, stop_at_no_work: bool) -> Self {
        self.stop_at_no_work = stop_at_no_work;
        self
    }
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_at_no_work: true,
        }
    }
}
