//! `ProjectionGroup` keeps a set of projections up to date in the background.
//!
//! # Overview
//!
//! Each projection in a group gets its own task. The task drains the event
//! source, then sleeps until one of three things happens:
//!
//! - its trigger slot is set ([`trigger_async`](ProjectionGroup::trigger_async)
//!   or [`trigger_sync`](ProjectionGroup::trigger_sync)),
//! - the poll interval elapses,
//! - the group is stopped.
//!
//! ```text
//!                ┌──────────────────┐
//!   trigger ───▶ │ slot (capacity 1)│ ──┐
//!                └──────────────────┘   ▼
//!                               ┌────────────────┐   errors   ┌──────────┐
//!   poll timer ───────────────▶ │ projection task│ ─────────▶ │ Receiver │
//!                               └────────────────┘ (try_send) └──────────┘
//! ```
//!
//! # Backpressure
//!
//! Pass failures are reported on a bounded channel with `try_send`. When the
//! host does not drain the channel and it fills up, further reports are
//! dropped (logged at `warn` and counted) and the task keeps serving
//! triggers. A slow consumer can lose error reports; it can never stall the
//! projections. A failing projection retries on its next trigger or poll,
//! which delivers the failing event again.
//!
//! # Example
//!
//! ```ignore
//! let (group, mut errors) = ProjectionGroup::new(vec![names, ages]);
//! group.start().await;
//!
//! store.save(events).await?;
//! group.trigger_sync().await?; // read models now include `events`
//!
//! group.stop().await;
//! ```

use crate::config::GroupConfig;
use crate::error::ProjectionError;
use crate::metrics as names;
use crate::projection::Projection;
use crate::signal::CancelSignal;
use metrics::counter;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Request for one more pass.
#[derive(Debug)]
enum Trigger {
    /// Run a pass; nobody waits for it.
    Async,
    /// Run a pass that starts after the trigger was received, then acknowledge.
    Sync(oneshot::Sender<()>),
}

/// Tasks and shutdown signal of a started group.
struct Started {
    shutdown: CancelSignal,
    tasks: Vec<JoinHandle<()>>,
}

/// A set of projections driven by background tasks.
pub struct ProjectionGroup {
    projections: Vec<Projection>,
    config: GroupConfig,
    errors: mpsc::Sender<ProjectionError>,
    /// Serializes `start`/`stop`; `Some` while running.
    lifecycle: Mutex<Option<Started>>,
    /// One trigger slot per projection; `None` while stopped.
    triggers: RwLock<Option<Vec<mpsc::Sender<Trigger>>>>,
}

impl ProjectionGroup {
    /// Create a stopped group with default settings.
    ///
    /// Returns the group and the receiving end of its error channel. The
    /// host should keep draining the receiver; see the module docs on
    /// backpressure.
    #[must_use]
    pub fn new(projections: Vec<Projection>) -> (Self, mpsc::Receiver<ProjectionError>) {
        Self::with_config(projections, GroupConfig::default())
    }

    /// Create a stopped group with explicit settings.
    #[must_use]
    pub fn with_config(
        projections: Vec<Projection>,
        config: GroupConfig,
    ) -> (Self, mpsc::Receiver<ProjectionError>) {
        let (errors, receiver) = mpsc::channel(config.error_channel_capacity.max(1));
        let group = Self {
            projections,
            config,
            errors,
            lifecycle: Mutex::new(None),
            triggers: RwLock::new(None),
        };
        (group, receiver)
    }

    /// The projections in this group, in the order given.
    #[must_use]
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Number of projections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    /// Whether the group has no projections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    /// Whether the group has been started and not stopped since.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.read_triggers().is_some()
    }

    /// Spawn one task per projection. Does nothing if already running.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return;
        }

        let shutdown = CancelSignal::new();
        let mut senders = Vec::with_capacity(self.projections.len());
        let mut tasks = Vec::with_capacity(self.projections.len());

        for projection in &self.projections {
            let (trigger_tx, trigger_rx) = mpsc::channel(1);
            senders.push(trigger_tx);
            tasks.push(tokio::spawn(projection_loop(
                projection.clone(),
                trigger_rx,
                shutdown.clone(),
                self.errors.clone(),
                self.config.poll_interval,
            )));
        }

        *self.write_triggers() = Some(senders);
        *lifecycle = Some(Started { shutdown, tasks });

        tracing::info!(
            projections = self.projections.len(),
            poll_interval = ?self.config.poll_interval,
            "Projection group started"
        );
    }

    /// Signal every task to exit and wait until all have.
    ///
    /// Idempotent: safe before `start`, on an empty group and when called
    /// repeatedly. A pass in progress finishes its current callback first.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(started) = lifecycle.take() else {
            return;
        };

        *self.write_triggers() = None;
        started.shutdown.cancel();

        for task in started.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Projection group task ended abnormally");
            }
        }

        tracing::info!(
            projections = self.projections.len(),
            "Projection group stopped"
        );
    }

    /// Run one more full pass on every projection and wait for all of them.
    ///
    /// Every event committed before this call is applied to the read models
    /// when it returns (unless a pass fails; failures go to the error
    /// channel as usual).
    ///
    /// # Errors
    ///
    /// [`ProjectionError::NotRunning`] if the group is stopped, or stops
    /// before every projection acknowledged.
    pub async fn trigger_sync(&self) -> Result<(), ProjectionError> {
        let senders = self.read_triggers().clone().ok_or(ProjectionError::NotRunning)?;

        let mut acks = Vec::with_capacity(senders.len());
        for sender in &senders {
            let (ack_tx, ack_rx) = oneshot::channel();
            sender
                .send(Trigger::Sync(ack_tx))
                .await
                .map_err(|_| ProjectionError::NotRunning)?;
            acks.push(ack_rx);
        }

        for ack in acks {
            ack.await.map_err(|_| ProjectionError::NotRunning)?;
        }
        Ok(())
    }

    /// Request one more pass on every projection without waiting.
    ///
    /// Calls made while a projection's slot is still set are merged: at
    /// least one pass happens after the latest call, not one per call. Does
    /// nothing while the group is stopped.
    pub fn trigger_async(&self) {
        let triggers = self.read_triggers();
        let Some(senders) = triggers.as_ref() else {
            tracing::debug!("Ignoring trigger on a stopped projection group");
            return;
        };

        for sender in senders {
            match sender.try_send(Trigger::Async) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Projection task already exited; trigger ignored");
                }
            }
        }
    }

    fn read_triggers(&self) -> RwLockReadGuard<'_, Option<Vec<mpsc::Sender<Trigger>>>> {
        self.triggers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_triggers(&self) -> RwLockWriteGuard<'_, Option<Vec<mpsc::Sender<Trigger>>>> {
        self.triggers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ProjectionGroup {
    fn drop(&mut self) {
        if let Some(started) = self.lifecycle.get_mut().take() {
            started.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for ProjectionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionGroup")
            .field("projections", &self.projections)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Background task driving one projection of a group.
async fn projection_loop(
    projection: Projection,
    mut triggers: mpsc::Receiver<Trigger>,
    shutdown: CancelSignal,
    errors: mpsc::Sender<ProjectionError>,
    poll_interval: Duration,
) {
    let mut running = match projection.begin() {
        Ok(running) => running,
        Err(error) => {
            report(&errors, projection.name(), error);
            return;
        }
    };
    let mut acks: Vec<oneshot::Sender<()>> = Vec::new();

    loop {
        match running.drain(&shutdown).await {
            Ok(()) => {}
            Err(error) if error.is_cancellation() => break,
            Err(error) => report(&errors, running.name(), error),
        }

        for ack in acks.drain(..) {
            // The caller may have given up waiting.
            let _ = ack.send(());
        }

        tokio::select! {
            biased;
            _ = shutdown.done() => break,
            trigger = triggers.recv() => match trigger {
                Some(Trigger::Sync(ack)) => acks.push(ack),
                Some(Trigger::Async) => {}
                None => break,
            },
            () = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!(projection = running.name(), "Projection group task exiting");
}

/// Hand an error to the host without blocking the task.
fn report(errors: &mpsc::Sender<ProjectionError>, projection: &str, error: ProjectionError) {
    match errors.try_send(error) {
        Ok(()) => {}
        Err(TrySendError::Full(error)) => {
            counter!(names::GROUP_ERRORS_DROPPED, "projection" => projection.to_string())
                .increment(1);
            tracing::warn!(
                projection,
                error = %error,
                "Error channel full; dropping projection error report"
            );
        }
        Err(TrySendError::Closed(error)) => {
            tracing::debug!(
                projection,
                error = %error,
                "Error channel closed; projection error not reported"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_group_lifecycle_is_a_no_op() {
        let (group, _errors) = ProjectionGroup::new(Vec::new());
        assert!(group.is_empty());

        group.stop().await;
        group.start().await;
        assert!(group.is_running());
        group.trigger_sync().await.ok();
        group.trigger_async();
        group.stop().await;
        group.stop().await;
        assert!(!group.is_running());
    }

    #[tokio::test]
    async fn trigger_sync_on_stopped_group_is_rejected() {
        let (group, _errors) = ProjectionGroup::new(Vec::new());
        assert!(matches!(
            group.trigger_sync().await,
            Err(ProjectionError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn full_error_channel_drops_reports() {
        let (errors, mut receiver) = mpsc::channel(1);
        report(&errors, "p", ProjectionError::Canceled);
        report(&errors, "p", ProjectionError::AlreadyRunning);

        assert!(matches!(receiver.recv().await, Some(ProjectionError::Canceled)));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_error_channel_is_tolerated() {
        let (errors, receiver) = mpsc::channel(1);
        drop(receiver);
        report(&errors, "p", ProjectionError::Canceled);
    }
}
