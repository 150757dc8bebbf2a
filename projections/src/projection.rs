//! Single projection: one event source, one callback, one cursor.
//!
//! # Overview
//!
//! A [`Projection`] replays the global event log through an async
//! application callback to build a read model. It holds its own cursor (the
//! next [`GlobalVersion`] to read) and moves it forward only after the
//! callback's future resolves successfully, so a failing event is delivered
//! again on the next run. The cursor never moves backwards.
//!
//! ```text
//! ┌─────────────┐  read_from(cursor, batch)  ┌────────────┐  decode   ┌──────────┐
//! │ EventSource │ ─────────────────────────▶ │ Projection │ ────────▶ │ callback │
//! └─────────────┘                            └────────────┘           └──────────┘
//!                                                  │ cursor = last handled + 1
//!                                                  ▼
//! ```
//!
//! # Single flight
//!
//! A projection's read model must never be driven by two callers at once.
//! [`run_once`](Projection::run_once), [`run`](Projection::run) and
//! [`catch_up`](Projection::catch_up) reject with
//! [`ProjectionError::AlreadyRunning`] when another run is in flight; they
//! never queue.
//!
//! # Example
//!
//! ```ignore
//! let projection = Projection::builder(store.clone(), registry.clone())
//!     .name("person-names")
//!     .batch_size(1)
//!     .build(move |event: &DecodedEvent| {
//!         let born = event.data::<Born>().cloned();
//!         let read_model = read_model.clone();
//!         async move {
//!             if let Some(born) = born {
//!                 read_model.insert_name(&born.name).await?;
//!             }
//!             Ok::<_, ReadModelError>(())
//!         }
//!     });
//!
//! let (work, result) = projection.run_once().await;
//! ```

use crate::config::ProjectionConfig;
use crate::error::{CallbackError, ProjectionError};
use crate::metrics::{self as names, error_kind};
use crate::signal::CancelSignal;
use eventline_core::{DecodedEvent, Event, EventRegistry, EventSource, GlobalVersion};
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Callback invoked once per event, in ascending global version order.
///
/// The returned future owns everything it needs; it is awaited to
/// completion before the next event is delivered.
type Callback =
    Box<dyn FnMut(&DecodedEvent) -> BoxFuture<'static, Result<(), CallbackError>> + Send>;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Outcome of a projection run.
///
/// Returned by [`Projection::run_once`], [`Projection::catch_up`] and, one
/// per participant, by a race.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Name of the projection, for diagnostics.
    pub name: String,
    /// Why the run stopped, or `None` on a clean pass or drain.
    pub error: Option<ProjectionError>,
    /// Last event the callback completed successfully (not the failing one).
    pub last_handled_event: Option<Event>,
}

impl RunResult {
    /// Whether the run ended without error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Mutable state guarded by the single-flight lock.
struct ProjectionState {
    callback: Callback,
}

struct Inner {
    name: String,
    source: Arc<dyn EventSource>,
    registry: Arc<EventRegistry>,
    batch_size: usize,
    /// Next global version to read.
    cursor: AtomicU64,
    /// Readable while a run holds `state`.
    last_handled: std::sync::Mutex<Option<Event>>,
    state: Mutex<ProjectionState>,
}

impl Inner {
    fn last_handled(&self) -> Option<Event> {
        self.last_handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_handled(&self, event: Event) {
        *self
            .last_handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(event);
    }
}

/// A reducer bound to one event source and one callback.
///
/// Cheap to clone; clones share the cursor, callback and single-flight lock.
#[derive(Clone)]
pub struct Projection {
    inner: Arc<Inner>,
}

/// Builder for [`Projection`].
pub struct ProjectionBuilder {
    source: Arc<dyn EventSource>,
    registry: Arc<EventRegistry>,
    name: Option<String>,
    config: ProjectionConfig,
}

impl ProjectionBuilder {
    /// Name used in logs, metrics and race results.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Maximum number of events pulled per pass.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.config = self.config.with_batch_size(batch_size);
        self
    }

    /// Global version to start reading at, e.g. a persisted resume position.
    #[must_use]
    pub const fn start(mut self, start: GlobalVersion) -> Self {
        self.config = self.config.with_start(start);
        self
    }

    /// Replace batch size and start position at once.
    #[must_use]
    pub const fn config(mut self, config: ProjectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the callback and build the projection.
    ///
    /// The callback receives each event by reference and returns a future
    /// that owns whatever it needs from it. The future may return any error
    /// type convertible into a boxed error; it reaches the caller unchanged
    /// as [`ProjectionError::Callback`].
    pub fn build<F, Fut, E>(self, mut callback: F) -> Projection
    where
        F: FnMut(&DecodedEvent) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let name = self.name.unwrap_or_else(|| {
            format!("projection-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
        });
        let callback: Callback = Box::new(move |event: &DecodedEvent| {
            callback(event)
                .map(|outcome| {
                    outcome.map_err(|e| {
                        let boxed: Box<dyn StdError + Send + Sync> = e.into();
                        CallbackError::from(boxed)
                    })
                })
                .boxed()
        });

        Projection {
            inner: Arc::new(Inner {
                name,
                source: self.source,
                registry: self.registry,
                batch_size: self.config.batch_size,
                cursor: AtomicU64::new(self.config.start.value()),
                last_handled: std::sync::Mutex::new(None),
                state: Mutex::new(ProjectionState { callback }),
            }),
        }
    }
}

impl Projection {
    /// Start building a projection over `source`, decoding with `registry`.
    #[must_use]
    pub fn builder(source: Arc<dyn EventSource>, registry: Arc<EventRegistry>) -> ProjectionBuilder {
        ProjectionBuilder {
            source,
            registry,
            name: None,
            config: ProjectionConfig::default(),
        }
    }

    /// Create a projection with default settings.
    pub fn new<F, Fut, E>(
        source: Arc<dyn EventSource>,
        registry: Arc<EventRegistry>,
        callback: F,
    ) -> Self
    where
        F: FnMut(&DecodedEvent) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::builder(source, registry).build(callback)
    }

    /// The projection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The next global version this projection will read.
    ///
    /// Persist it to resume after a restart via [`ProjectionBuilder::start`].
    #[must_use]
    pub fn position(&self) -> GlobalVersion {
        GlobalVersion::new(self.inner.cursor.load(Ordering::Acquire))
    }

    /// Whether a run currently holds the single-flight lock.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.try_lock().is_err()
    }

    /// Last event the callback completed, including while a run (or a
    /// group loop) is in flight.
    #[must_use]
    pub fn last_handled_event(&self) -> Option<Event> {
        self.inner.last_handled()
    }

    /// Pull and process one batch.
    ///
    /// Returns `(true, ..)` when the batch had events. An error halts the
    /// batch at the failing event; the cursor stays there and
    /// `last_handled_event` names the last event that succeeded.
    pub async fn run_once(&self) -> (bool, RunResult) {
        let mut running = match self.begin() {
            Ok(running) => running,
            Err(error) => return (false, self.rejected(error)),
        };
        match running.pass().await {
            Ok(work) => (work, running.result(None)),
            Err(error) => {
                // A failed read found no batch; any other error halted one.
                let work = !matches!(error, ProjectionError::Source(_));
                (work, running.result(Some(error)))
            }
        }
    }

    /// Process events until `signal` fires or a pass fails.
    ///
    /// Drains while batches keep coming, then waits up to `poll_interval` or
    /// until the signal fires. Returns the reason it stopped:
    /// [`ProjectionError::Canceled`], [`ProjectionError::DeadlineExceeded`],
    /// [`ProjectionError::AlreadyRunning`], or the pass error verbatim.
    pub async fn run(&self, signal: &CancelSignal, poll_interval: Duration) -> ProjectionError {
        let mut running = match self.begin() {
            Ok(running) => running,
            Err(error) => return error,
        };
        tracing::debug!(projection = %self.inner.name, "Projection run started");
        let error = running
            .run_loop(signal, poll_interval, false)
            .await
            .unwrap_or(ProjectionError::Canceled);
        tracing::debug!(projection = %self.inner.name, error = %error, "Projection run stopped");
        error
    }

    /// Process events until the source has none left, then return.
    ///
    /// A clean drain yields a result without error.
    pub async fn catch_up(&self, signal: &CancelSignal) -> RunResult {
        self.run_until(signal, Duration::ZERO, true).await
    }

    /// Shared loop for `catch_up` and race participants.
    pub(crate) async fn run_until(
        &self,
        signal: &CancelSignal,
        poll_interval: Duration,
        stop_at_no_work: bool,
    ) -> RunResult {
        let mut running = match self.begin() {
            Ok(running) => running,
            Err(error) => return self.rejected(error),
        };
        let error = running
            .run_loop(signal, poll_interval, stop_at_no_work)
            .await;
        running.result(error)
    }

    /// Take the single-flight lock.
    pub(crate) fn begin(&self) -> Result<Running<'_>, ProjectionError> {
        let state = self
            .inner
            .state
            .try_lock()
            .map_err(|_| ProjectionError::AlreadyRunning)?;
        Ok(Running {
            inner: &self.inner,
            state,
        })
    }

    fn rejected(&self, error: ProjectionError) -> RunResult {
        tracing::warn!(projection = %self.inner.name, "Projection is already running");
        RunResult {
            name: self.inner.name.clone(),
            error: Some(error),
            last_handled_event: self.inner.last_handled(),
        }
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("name", &self.inner.name)
            .field("batch_size", &self.inner.batch_size)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

/// A projection whose single-flight lock is held.
pub(crate) struct Running<'a> {
    inner: &'a Inner,
    state: MutexGuard<'a, ProjectionState>,
}

impl Running<'_> {
    /// Pull one batch and feed it to the callback.
    ///
    /// `Ok(false)` means the source had nothing at the cursor.
    pub(crate) async fn pass(&mut self) -> Result<bool, ProjectionError> {
        let inner = self.inner;
        let name = inner.name.as_str();
        let outcome = self.apply_batch().await;

        match &outcome {
            Ok(work) => {
                counter!(names::PASSES, "projection" => name.to_string(), "work" => work.to_string())
                    .increment(1);
            }
            Err(error) => {
                counter!(
                    names::PASS_ERRORS,
                    "projection" => name.to_string(),
                    "kind" => error_kind(error)
                )
                .increment(1);
                tracing::error!(
                    projection = name,
                    position = %GlobalVersion::new(inner.cursor.load(Ordering::Acquire)),
                    error = %error,
                    "Projection pass halted"
                );
            }
        }
        outcome
    }

    async fn apply_batch(&mut self) -> Result<bool, ProjectionError> {
        let from = GlobalVersion::new(self.inner.cursor.load(Ordering::Acquire));
        let events = self
            .inner
            .source
            .read_from(from, self.inner.batch_size)
            .await?;
        if events.is_empty() {
            return Ok(false);
        }

        let mut handled = 0_u64;
        let mut outcome = Ok(true);
        for event in events {
            if let Err(error) = self.apply_event(event).await {
                outcome = Err(error);
                break;
            }
            handled += 1;
        }

        if handled > 0 {
            counter!(names::EVENTS_HANDLED, "projection" => self.inner.name.clone())
                .increment(handled);
        }
        tracing::debug!(
            projection = %self.inner.name,
            events = handled,
            position = %GlobalVersion::new(self.inner.cursor.load(Ordering::Acquire)),
            "Projection pass applied batch"
        );
        outcome
    }

    async fn apply_event(&mut self, event: Event) -> Result<(), ProjectionError> {
        let global_version = event.global_version;
        let decoded = self.inner.registry.decode(event)?;
        let callback = &mut self.state.callback;
        let handling = callback(&decoded);
        handling.await.map_err(ProjectionError::Callback)?;

        // A misbehaving source must not rewind the cursor.
        self.inner
            .cursor
            .fetch_max(global_version.next().value(), Ordering::AcqRel);
        self.inner.set_last_handled(decoded.into_event());
        Ok(())
    }

    /// Run passes until the source is empty.
    ///
    /// Checks `signal` between passes and yields to the scheduler after each
    /// batch so sibling projections on the same runtime keep progressing.
    pub(crate) async fn drain(&mut self, signal: &CancelSignal) -> Result<(), ProjectionError> {
        loop {
            signal.check()?;
            if !self.pass().await? {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
    }

    /// Loop behind `run`, `catch_up` and race participants.
    ///
    /// Returns `None` only for a clean drain with `stop_at_no_work`.
    pub(crate) async fn run_loop(
        &mut self,
        signal: &CancelSignal,
        poll_interval: Duration,
        stop_at_no_work: bool,
    ) -> Option<ProjectionError> {
        loop {
            if let Err(reason) = self.drain(signal).await {
                return Some(reason);
            }
            if stop_at_no_work {
                return None;
            }
            tokio::select! {
                reason = signal.done() => return Some(reason),
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    pub(crate) fn result(&self, error: Option<ProjectionError>) -> RunResult {
        RunResult {
            name: self.inner.name.clone(),
            error,
            last_handled_event: self.inner.last_handled(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.inner.name
    }
}
