//! Metric names and registration for the projection engine.
//!
//! Metrics are emitted through the `metrics` facade; install any recorder
//! (for example a Prometheus exporter) in the host to collect them. Without
//! a recorder the calls are no-ops.

use metrics::{Unit, describe_counter, describe_histogram};

/// Events handled successfully, labelled by projection.
pub const EVENTS_HANDLED: &str = "eventline_projection_events_total";

/// Passes that halted with an error, labelled by projection and kind.
pub const PASS_ERRORS: &str = "eventline_projection_errors_total";

/// Passes run, labelled by projection and whether they found work.
pub const PASSES: &str = "eventline_projection_passes_total";

/// Group error reports dropped because the error channel was full.
pub const GROUP_ERRORS_DROPPED: &str = "eventline_group_errors_dropped_total";

/// Wall-clock duration of a race.
pub const RACE_DURATION: &str = "eventline_race_duration_seconds";

/// Register descriptions for all projection metrics.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(
        EVENTS_HANDLED,
        Unit::Count,
        "Events successfully applied by projection callbacks"
    );
    describe_counter!(
        PASS_ERRORS,
        Unit::Count,
        "Projection passes halted by a registration, decode or callback error"
    );
    describe_counter!(PASSES, Unit::Count, "Projection passes run");
    describe_counter!(
        GROUP_ERRORS_DROPPED,
        Unit::Count,
        "Group error reports dropped on a full error channel"
    );
    describe_histogram!(
        RACE_DURATION,
        Unit::Seconds,
        "Time from race start until every participant exited"
    );
}

/// Short label naming an error kind.
pub(crate) const fn error_kind(error: &crate::ProjectionError) -> &'static str {
    use crate::ProjectionError;
    match error {
        ProjectionError::EventNotRegistered { .. } => "not_registered",
        ProjectionError::Decode(_) => "decode",
        ProjectionError::Callback(_) => "callback",
        ProjectionError::AlreadyRunning => "already_running",
        ProjectionError::Canceled => "canceled",
        ProjectionError::DeadlineExceeded => "deadline_exceeded",
        ProjectionError::Source(_) => "source",
        ProjectionError::NotRunning => "not_running",
        ProjectionError::TaskFailed(_) => "task_failed",
    }
}
