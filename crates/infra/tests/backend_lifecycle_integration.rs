//! Backend lifecycle integration tests
//!
//! Exercises cancellation and shutdown through the blocking facade against
//! the in-memory store with simulated latency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use calbridge_core::{CalendarBackend, Request};
use calbridge_domain::{
    CalbridgeError, CalendarItem, CollectionId, Config, ErrorKind, ItemFilter, ItemQuery,
    RequestState, ShutdownPolicy, TimeWindow,
};
use calbridge_infra::{BroadcastChangeSink, InMemoryCalendarStore, RuleExpander};
use chrono::{TimeZone, Utc};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("test runtime")
}

fn backend(runtime: &Runtime, store: &Arc<InMemoryCalendarStore>, config: &Config) -> CalendarBackend {
    CalendarBackend::new(
        Arc::clone(store) as Arc<dyn calbridge_core::CalendarStore>,
        Arc::new(RuleExpander::new()),
        Arc::new(BroadcastChangeSink::default()),
        config,
        runtime.handle().clone(),
    )
}

fn meeting(collection: &str, label: &str) -> CalendarItem {
    let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
    CalendarItem::event(collection, label).with_times(start, start + chrono::Duration::hours(1))
}

fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Validates shutdown of a backend with an in-flight save.
///
/// # Test Steps
/// 1. Start a save against a store whose calls take ten seconds
/// 2. Shut the backend down
/// 3. Verify the request is Cancelled, nothing was written, and the live
///    handle count reaches zero
/// 4. Verify later saves are rejected with ShuttingDown
#[test]
fn test_shutdown_cancels_in_flight_and_rejects_new_requests() {
    let runtime = runtime();
    let store = Arc::new(
        InMemoryCalendarStore::new().with_collection("work").with_latency(Duration::from_secs(10)),
    );
    let backend = backend(&runtime, &store, &Config::default());

    let running = Request::save(vec![meeting("work", "in flight")]);
    backend.start_request(&running).unwrap();
    assert_eq!(backend.shutdown(), 1);

    let outcome = running.wait_settled(Some(Duration::from_secs(5))).expect("outcome published");
    assert_eq!(running.state(), RequestState::Cancelled);
    assert_eq!(outcome.error, ErrorKind::Cancelled);
    assert!(eventually(Duration::from_secs(5), || backend.live_requests() == 0));
    assert_eq!(store.series_count(), 0);

    let err = backend.save_items(vec![meeting("work", "too late")], None).unwrap_err();
    assert!(matches!(err, CalbridgeError::ShuttingDown(_)));
}

/// Validates the cancel shutdown policy.
///
/// # Test Steps
/// 1. Build a backend with the `cancel` shutdown policy and shut it down
/// 2. Start a new save
/// 3. Verify the request is accepted but ends Cancelled without a write
#[test]
fn test_cancel_policy_registers_and_cancels() {
    let runtime = runtime();
    let store = Arc::new(InMemoryCalendarStore::new().with_collection("work"));
    let mut config = Config::default();
    config.backend.shutdown_policy = ShutdownPolicy::Cancel;
    let backend = backend(&runtime, &store, &config);
    backend.shutdown();

    let late = Request::save(vec![meeting("work", "late")]);
    backend.start_request(&late).unwrap();
    assert!(backend.wait_for_request_finished(&late, Some(Duration::from_secs(5))));
    assert_eq!(late.state(), RequestState::Cancelled);
    assert_eq!(store.series_count(), 0);
}

/// Validates a cancelled request through the facade.
///
/// # Test Steps
/// 1. Start a save against a slow store
/// 2. Cancel it and wait
/// 3. Verify the Cancelled state and that the store holds nothing
#[test]
fn test_cancel_request_before_store_completion() {
    let runtime = runtime();
    let store = Arc::new(
        InMemoryCalendarStore::new().with_collection("work").with_latency(Duration::from_secs(10)),
    );
    let backend = backend(&runtime, &store, &Config::default());

    let request = Request::save(vec![meeting("work", "slow")]);
    backend.start_request(&request).unwrap();
    assert!(backend.cancel_request(&request));
    assert!(backend.wait_for_request_finished(&request, Some(Duration::from_secs(5))));
    assert_eq!(request.state(), RequestState::Cancelled);
    assert_eq!(store.series_count(), 0);
}

/// Validates per-collection failures with the real store.
///
/// # Test Steps
/// 1. Register collection "work" and lock collection "shared"
/// 2. Save one item into each, plus one into an unknown collection
/// 3. Verify only the "work" item is stored and the others fail with
///    Locked and NotFound
#[test]
fn test_locked_and_unknown_collections_fail_their_items() {
    let runtime = runtime();
    let store = Arc::new(InMemoryCalendarStore::new().with_collection("work").with_collection("shared"));
    store.set_locked(&CollectionId::new("shared"), true);
    let backend = backend(&runtime, &store, &Config::default());

    let result = backend
        .save_items(
            vec![meeting("work", "ok"), meeting("shared", "busy"), meeting("nowhere", "lost")],
            None,
        )
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error, ErrorKind::NoError);
    assert_eq!(result.error_map.get(&1), Some(&ErrorKind::Locked));
    assert_eq!(result.error_map.get(&2), Some(&ErrorKind::NotFound));
    assert_eq!(store.series_count(), 1);

    let window = TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 7, 0, 0, 0).unwrap(),
    );
    let found = backend.items(ItemQuery::range(ItemFilter::all(), window)).unwrap();
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].display_label, "ok");
}
