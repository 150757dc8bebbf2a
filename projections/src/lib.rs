//! Projection engine for Eventline.
//!
//! # Overview
//!
//! A projection replays the global event log, in [`GlobalVersion`] order,
//! through an application callback to build a read model. This crate drives
//! projections three ways:
//!
//! - **[`Projection`]**: run one pass ([`run_once`](Projection::run_once)),
//!   drain the source ([`catch_up`](Projection::catch_up)) or keep up until
//!   canceled ([`run`](Projection::run)).
//! - **[`ProjectionGroup`]**: one background task per projection, woken by
//!   triggers or a poll interval, failures reported on a channel.
//! - **[`race`]**: run several projections concurrently until the first one
//!   drains or fails, then stop the rest.
//!
//! ```text
//! writer ──▶ validate_events ──▶ EventStore ──▶ Projection(s) ──▶ read models
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eventline_projections::{Projection, ProjectionGroup};
//!
//! let names = Projection::builder(store.clone(), registry.clone())
//!     .name("names")
//!     .build(|event| async { /* update read model */ Ok::<_, MyError>(()) });
//!
//! let (group, mut errors) = ProjectionGroup::new(vec![names]);
//! group.start().await;
//! group.trigger_sync().await?;
//! group.stop().await;
//! ```
//!
//! [`GlobalVersion`]: eventline_core::GlobalVersion

pub mod config;
pub mod error;
pub mod group;
pub mod metrics;
pub mod projection;
pub mod race;
pub mod signal;

pub use config::{GroupConfig, ProjectionConfig, RaceConfig};
pub use error::{CallbackError, ProjectionError, Result};
pub use group::ProjectionGroup;
pub use projection::{Projection, ProjectionBuilder, RunResult};
pub use race::{ProjectionRace, race};
pub use signal::CancelSignal;
