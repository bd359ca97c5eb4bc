//! Shared test helpers for `calbridge-core` integration tests.
//!
//! These helpers provide a scriptable in-memory store and a recording change
//! sink so that lifecycle tests can focus on behaviour instead of
//! boilerplate.

#![allow(dead_code)]

pub mod sink;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use calbridge_core::{CalendarBackend, CalendarStore, ChangeSink, RecurrenceExpander};
use calbridge_domain::{CalendarItem, Config, RecurrenceRule, TimeWindow};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::runtime::Runtime;

pub use sink::RecordingSink;
pub use store::ScriptedStore;

/// Poll `condition` until it holds or `timeout` elapses.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async variant of [`eventually`] asserting the condition.
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Expander producing one occurrence per `interval` days, ignoring zones.
pub struct DailyExpander;

impl RecurrenceExpander for DailyExpander {
    fn expand(
        &self,
        rule: &RecurrenceRule,
        series_start: DateTime<Utc>,
        _zone: Tz,
        window: &TimeWindow,
        max: usize,
    ) -> Vec<DateTime<Utc>> {
        let count = i64::from(rule.limit_count().unwrap_or(60));
        let step = i64::from(rule.interval.max(1));
        (0..count)
            .map(|n| series_start + chrono::Duration::days(n * step))
            .filter(|at| window.contains(*at))
            .take(max)
            .collect()
    }
}

/// Multi-thread runtime owned by a blocking test.
pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("test runtime")
}

/// Backend over `store` and `sink`, spawning onto `runtime`.
pub fn backend(
    runtime: &Runtime,
    store: &Arc<ScriptedStore>,
    sink: &Arc<RecordingSink>,
    config: &Config,
) -> CalendarBackend {
    let store: Arc<dyn CalendarStore> = Arc::clone(store) as Arc<dyn CalendarStore>;
    let sink: Arc<dyn ChangeSink> = Arc::clone(sink) as Arc<dyn ChangeSink>;
    CalendarBackend::new(store, Arc::new(DailyExpander), sink, config, runtime.handle().clone())
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn event(collection: &str, label: &str) -> CalendarItem {
    CalendarItem::event(collection, label).with_times(at(1, 9), at(1, 10))
}
