//! Run several projections to "now" concurrently; the first to finish stops
//! the rest.
//!
//! Every participant runs in its own task on a child of one shared
//! [`CancelSignal`]. As soon as any participant exits, by draining the
//! source or by failing, it records its outcome as the race's cause and
//! fires the shared signal. The others unwind with
//! [`ProjectionError::Canceled`] at their next pass boundary.
//!
//! # Example
//!
//! ```ignore
//! let (results, cause) = race(true, &[names, ages]).await;
//! if let Some(error) = cause {
//!     let failed = results.iter().find(|r| r.error.is_some());
//!     // `failed.last_handled_event` is where that projection stopped
//! }
//! ```

use crate::config::RaceConfig;
use crate::error::ProjectionError;
use crate::metrics as names;
use crate::projection::{Projection, RunResult};
use crate::signal::{CancelOnDrop, CancelSignal};
use futures::FutureExt;
use metrics::histogram;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Race `projections` with default settings.
///
/// Returns one result per projection (index-aligned with the input) and the
/// error of the participant whose exit stopped the race, or `None` if that
/// participant drained cleanly.
///
/// With `stop_at_no_work` an empty batch ends a participant. Without it,
/// participants idle between passes and the race only ends on an error.
pub async fn race(
    stop_at_no_work: bool,
    projections: &[Projection],
) -> (Vec<RunResult>, Option<ProjectionError>) {
    ProjectionRace::new()
        .stop_at_no_work(stop_at_no_work)
        .run(projections)
        .await
}

/// Configurable race runner.
#[derive(Debug, Clone, Default)]
pub struct ProjectionRace {
    config: RaceConfig,
    parent: Option<CancelSignal>,
}

impl ProjectionRace {
    /// A race with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A race with explicit settings.
    #[must_use]
    pub const fn with_config(config: RaceConfig) -> Self {
        Self {
            config,
            parent: None,
        }
    }

    /// Wait between passes when idle. Only used without `stop_at_no_work`.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config = self.config.with_poll_interval(poll_interval);
        self
    }

    /// Whether an empty batch ends a participant.
    #[must_use]
    pub const fn stop_at_no_work(mut self, stop_at_no_work: bool) -> Self {
        self.config = self.config.with_stop_at_no_work(stop_at_no_work);
        self
    }

    /// Derive the shared signal from `parent`, so canceling it (or its
    /// deadline) also stops the race.
    #[must_use]
    pub fn with_signal(mut self, parent: CancelSignal) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Run the race and wait for every participant to exit.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn run(&self, projections: &[Projection]) -> (Vec<RunResult>, Option<ProjectionError>) {
        let started = Instant::now();
        let shared = self
            .parent
            .as_ref()
            .map_or_else(CancelSignal::new, CancelSignal::child);
        let cause: Arc<OnceLock<Option<ProjectionError>>> = Arc::new(OnceLock::new());

        let handles: Vec<_> = projections
            .iter()
            .map(|projection| {
                let projection = projection.clone();
                let signal = shared.clone();
                let cause = Arc::clone(&cause);
                let config = self.config;
                tokio::spawn(async move {
                    let _stop_others = CancelOnDrop(signal.clone());
                    let run = projection.run_until(
                        &signal,
                        config.poll_interval,
                        config.stop_at_no_work,
                    );
                    let result = match AssertUnwindSafe(run).catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => RunResult {
                            name: projection.name().to_string(),
                            error: Some(ProjectionError::TaskFailed(panic_message(&*panic))),
                            last_handled_event: None,
                        },
                    };
                    // First exit wins; later ones were caused by it.
                    let _ = cause.set(result.error.clone());
                    result
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (projection, handle) in projections.iter().zip(handles) {
            let result = handle.await.unwrap_or_else(|e| {
                tracing::error!(
                    projection = projection.name(),
                    error = %e,
                    "Race participant ended abnormally"
                );
                let error = ProjectionError::TaskFailed(e.to_string());
                let _ = cause.set(Some(error.clone()));
                RunResult {
                    name: projection.name().to_string(),
                    error: Some(error),
                    last_handled_event: None,
                }
            });
            results.push(result);
        }
        shared.cancel();

        let cause = cause.get().cloned().flatten();
        let elapsed = started.elapsed();
        histogram!(names::RACE_DURATION).record(elapsed.as_secs_f64());
        tracing::info!(
            participants = results.len(),
            elapsed = ?elapsed,
            cause = cause.as_ref().map(ToString::to_string),
            "Projection race finished"
        );

        (results, cause)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "participant panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_race_has_no_cause() {
        let (results, cause) = race(true, &[]).await;
        assert!(results.is_empty());
        assert!(cause.is_none());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "participant panicked");
    }

    #[test]
    fn builder_sets_config() {
        let race = ProjectionRace::new()
            .stop_at_no_work(false)
            .with_poll_interval(Duration::from_millis(5));
        assert!(!race.config.stop_at_no_work);
        assert_eq!(race.config.poll_interval, Duration::from_millis(5));
    }
}
