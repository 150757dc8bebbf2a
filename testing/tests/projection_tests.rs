//! Integration tests for single projections over the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use eventline_core::{DecodedEvent, EventRegistry, EventStore, GlobalVersion};
use eventline_projections::{CancelSignal, Projection, ProjectionError};
use eventline_testing::{
    Born, InMemoryEventStore, create_person, init_test_tracing, person_events, person_registry,
};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, thiserror::Error)]
#[error("application error")]
struct ApplicationError;

fn setup() -> (Arc<InMemoryEventStore>, Arc<EventRegistry>) {
    init_test_tracing();
    (
        Arc::new(InMemoryEventStore::new()),
        Arc::new(person_registry()),
    )
}

/// Projection that records the name of the last `Born` event it saw.
fn name_projection(
    store: &Arc<InMemoryEventStore>,
    registry: &Arc<EventRegistry>,
) -> (Projection, Arc<Mutex<String>>) {
    let projected = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&projected);
    let projection = Projection::builder(store.clone(), registry.clone())
        .name("names")
        .batch_size(1)
        .build(move |event: &DecodedEvent| {
            let born = event.data::<Born>().cloned();
            let sink = Arc::clone(&sink);
            async move {
                if let Some(born) = born {
                    *sink.lock().unwrap() = born.name;
                }
                Ok::<_, Infallible>(())
            }
        });
    (projection, projected)
}

/// Projection that records every global version it handles.
fn version_projection(
    store: &Arc<InMemoryEventStore>,
    registry: &Arc<EventRegistry>,
    batch_size: usize,
) -> (Projection, Arc<Mutex<Vec<u64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let projection = Projection::builder(store.clone(), registry.clone())
        .batch_size(batch_size)
        .build(move |event: &DecodedEvent| {
            sink.lock().unwrap().push(event.global_version().value());
            async { Ok::<_, Infallible>(()) }
        });
    (projection, seen)
}

#[tokio::test]
async fn run_once_applies_one_batch_per_call() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 0).await.unwrap();
    create_person(store.as_ref(), "anka", 0).await.unwrap();
    let (projection, projected) = name_projection(&store, &registry);

    let (work, result) = projection.run_once().await;
    assert!(work);
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(*projected.lock().unwrap(), "kalle");

    let (work, result) = projection.run_once().await;
    assert!(work);
    assert!(result.is_ok());
    assert_eq!(*projected.lock().unwrap(), "anka");
    assert_eq!(
        result.last_handled_event.unwrap().global_version,
        GlobalVersion::new(2)
    );
}

#[tokio::test]
async fn replay_observes_every_global_version_once_in_order() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 5).await.unwrap();
    let (projection, seen) = version_projection(&store, &registry, 1);

    for _ in 0..6 {
        let (work, result) = projection.run_once().await;
        assert!(work);
        assert!(result.is_ok());
    }

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(projection.position(), GlobalVersion::new(7));
}

#[tokio::test]
async fn exhausted_source_reports_no_work_and_keeps_cursor() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 1).await.unwrap();
    let (projection, _) = name_projection(&store, &registry);

    let result = projection.catch_up(&CancelSignal::new()).await;
    assert!(result.is_ok());
    let position = projection.position();

    let (work, result) = projection.run_once().await;
    assert!(!work);
    assert!(result.is_ok());
    assert_eq!(projection.position(), position);
}

#[tokio::test]
async fn partial_consumption_resumes_without_redelivery() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 3).await.unwrap();
    let (projection, seen) = version_projection(&store, &registry, 2);

    projection.run_once().await;
    create_person(store.as_ref(), "anka", 0).await.unwrap();
    let result = projection.catch_up(&CancelSignal::new()).await;

    assert!(result.is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn callback_can_await_a_store_write() {
    let (store, registry) = setup();
    let (audit, _) = setup();
    create_person(store.as_ref(), "kalle", 2).await.unwrap();

    let target = Arc::clone(&audit);
    let projection = Projection::new(store.clone(), registry, move |event: &DecodedEvent| {
        let born = event.data::<Born>().cloned();
        let target = Arc::clone(&target);
        async move {
            if let Some(born) = born {
                target.save(person_events(&born.name, 0)?).await?;
            }
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
        }
    });

    let result = projection.catch_up(&CancelSignal::new()).await;
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(audit.len().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_returns_deadline_exceeded_after_draining() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 1).await.unwrap();
    let (projection, projected) = name_projection(&store, &registry);

    let signal = CancelSignal::new().with_timeout(Duration::from_secs(1));
    let error = projection.run(&signal, Duration::from_secs(10)).await;

    assert!(matches!(error, ProjectionError::DeadlineExceeded));
    assert_eq!(*projected.lock().unwrap(), "kalle");
}

#[tokio::test]
async fn run_returns_canceled_when_signal_fires() {
    let (store, registry) = setup();
    let (projection, _) = name_projection(&store, &registry);

    let signal = CancelSignal::new();
    let canceler = signal.clone();
    let handle = tokio::spawn(async move { projection.run(&signal, Duration::from_secs(10)).await });

    canceler.cancel();
    let error = handle.await.unwrap();
    assert!(matches!(error, ProjectionError::Canceled));
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 0).await.unwrap();

    let started = Arc::new(Notify::new());
    let notify = Arc::clone(&started);
    let projection = Projection::new(store.clone(), registry, move |_: &DecodedEvent| {
        notify.notify_one();
        async { Ok::<_, Infallible>(()) }
    });

    let signal = CancelSignal::new().with_timeout(Duration::from_secs(5));
    let background = projection.clone();
    let background_signal = signal.clone();
    let handle = tokio::spawn(async move {
        background
            .run(&background_signal, Duration::from_secs(10))
            .await
    });

    started.notified().await;
    assert!(projection.is_running());

    let error = projection.run(&signal, Duration::from_secs(10)).await;
    assert!(matches!(error, ProjectionError::AlreadyRunning));

    let (work, result) = projection.run_once().await;
    assert!(!work);
    assert!(matches!(result.error, Some(ProjectionError::AlreadyRunning)));

    signal.cancel();
    assert!(matches!(handle.await.unwrap(), ProjectionError::Canceled));
}

#[tokio::test]
async fn unregistered_event_halts_pass() {
    let (store, _) = setup();
    create_person(store.as_ref(), "kalle", 1).await.unwrap();

    let projection = Projection::new(
        store.clone(),
        Arc::new(EventRegistry::new()),
        |_: &DecodedEvent| async { Ok::<_, Infallible>(()) },
    );

    let (_, result) = projection.run_once().await;
    assert!(matches!(
        result.error,
        Some(ProjectionError::EventNotRegistered { ref aggregate_type, ref reason })
            if aggregate_type == "Person" && reason == "Born"
    ));
    assert!(result.last_handled_event.is_none());
    assert_eq!(projection.position(), GlobalVersion::FIRST);
}

#[tokio::test]
async fn callback_error_halts_batch_and_redelivers_on_retry() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 4).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let fail_at_three = Arc::new(Mutex::new(true));
    let (sink, fail) = (Arc::clone(&seen), Arc::clone(&fail_at_three));
    let projection = Projection::builder(store.clone(), registry)
        .batch_size(10)
        .build(move |event: &DecodedEvent| {
            let version = event.global_version().value();
            let outcome = if version == 3 && *fail.lock().unwrap() {
                Err(ApplicationError)
            } else {
                sink.lock().unwrap().push(version);
                Ok(())
            };
            async move { outcome }
        });

    let (work, result) = projection.run_once().await;
    assert!(work);
    let error = result.error.unwrap();
    assert!(error.callback_error::<ApplicationError>().is_some());
    assert_eq!(
        result.last_handled_event.unwrap().global_version,
        GlobalVersion::new(2)
    );
    assert_eq!(projection.position(), GlobalVersion::new(3));

    *fail_at_three.lock().unwrap() = false;
    let result = projection.catch_up(&CancelSignal::new()).await;
    assert!(result.is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn start_position_skips_earlier_events() {
    let (store, registry) = setup();
    create_person(store.as_ref(), "kalle", 2).await.unwrap();
    create_person(store.as_ref(), "anka", 0).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let projection = Projection::builder(store.clone(), registry)
        .start(GlobalVersion::new(4))
        .build(move |event: &DecodedEvent| {
            sink.lock().unwrap().push(event.global_version().value());
            async { Ok::<_, Infallible>(()) }
        });

    projection.catch_up(&CancelSignal::new()).await;
    assert_eq!(*seen.lock().unwrap(), vec![4]);
}
