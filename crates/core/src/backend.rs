//! Backend facade offering the synchronous and async calendar entry points.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use calbridge_domain::{
    CalbridgeError, CalendarItem, Config, EditMode, ErrorKind, ItemId, ItemQuery, RequestOutcome,
    Result,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::calendar_ports::{CalendarStore, ChangeSink, RecurrenceExpander};
use crate::request::{Request, RequestOrchestrator};

/// Result of a save call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    pub error: ErrorKind,
    pub error_map: BTreeMap<usize, ErrorKind>,
    /// Persisted items, carrying the identities assigned by the store.
    pub items: Vec<CalendarItem>,
}

impl From<RequestOutcome> for SaveResult {
    fn from(outcome: RequestOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            error: outcome.error,
            error_map: outcome.error_map,
            items: outcome.items,
        }
    }
}

/// Result of a remove call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub success: bool,
    pub error: ErrorKind,
    pub error_map: BTreeMap<usize, ErrorKind>,
}

impl From<RequestOutcome> for RemoveResult {
    fn from(outcome: RequestOutcome) -> Self {
        Self { success: outcome.is_success(), error: outcome.error, error_map: outcome.error_map }
    }
}

/// Result of a query call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub error: ErrorKind,
    pub error_map: BTreeMap<usize, ErrorKind>,
    pub items: Vec<CalendarItem>,
}

impl From<RequestOutcome> for QueryResult {
    fn from(outcome: RequestOutcome) -> Self {
        Self { error: outcome.error, error_map: outcome.error_map, items: outcome.items }
    }
}

/// Calendar backend.
///
/// The blocking calls park the calling thread until the request settles, so
/// they must not run on a thread that drives the runtime the backend spawns
/// onto. Dropping the backend shuts it down.
pub struct CalendarBackend {
    orchestrator: RequestOrchestrator,
    wait_timeout: Option<Duration>,
}

impl CalendarBackend {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        expander: Arc<dyn RecurrenceExpander>,
        sink: Arc<dyn ChangeSink>,
        config: &Config,
        runtime: Handle,
    ) -> Self {
        let orchestrator = RequestOrchestrator::new(store, expander, sink, config, runtime);
        Self::from_orchestrator(orchestrator, config)
    }

    pub fn from_orchestrator(orchestrator: RequestOrchestrator, config: &Config) -> Self {
        let wait_timeout = match config.backend.wait_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self { orchestrator, wait_timeout }
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    pub fn start_request(&self, request: &Request) -> Result<()> {
        self.orchestrator.start(request).map(|_| ())
    }

    pub fn cancel_request(&self, request: &Request) -> bool {
        self.orchestrator.cancel(request)
    }

    /// Block until `request` leaves the active state; `None` waits forever.
    ///
    /// Returns false on timeout, with the request still running.
    pub fn wait_for_request_finished(&self, request: &Request, timeout: Option<Duration>) -> bool {
        self.orchestrator.wait(request, timeout)
    }

    pub fn save_items(&self, items: Vec<CalendarItem>, mode: Option<EditMode>) -> Result<SaveResult> {
        self.run_blocking(&save_request(items, mode)).map(SaveResult::from)
    }

    pub fn remove_items(&self, ids: Vec<ItemId>) -> Result<RemoveResult> {
        self.run_blocking(&Request::remove(ids)).map(RemoveResult::from)
    }

    pub fn items(&self, query: ItemQuery) -> Result<QueryResult> {
        self.run_blocking(&Request::query(query)).map(QueryResult::from)
    }

    pub async fn save_items_async(
        &self,
        items: Vec<CalendarItem>,
        mode: Option<EditMode>,
    ) -> Result<SaveResult> {
        self.run_async(&save_request(items, mode)).await.map(SaveResult::from)
    }

    pub async fn remove_items_async(&self, ids: Vec<ItemId>) -> Result<RemoveResult> {
        self.run_async(&Request::remove(ids)).await.map(RemoveResult::from)
    }

    pub async fn items_async(&self, query: ItemQuery) -> Result<QueryResult> {
        self.run_async(&Request::query(query)).await.map(QueryResult::from)
    }

    /// Switch to draining and cancel every live request.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.orchestrator.shutdown();
        info!(cancelled, "calendar backend shut down");
        cancelled
    }

    pub fn live_requests(&self) -> usize {
        self.orchestrator.live_requests()
    }

    fn run_blocking(&self, request: &Request) -> Result<RequestOutcome> {
        self.start_request(request)?;
        let deadline = self.wait_timeout.map(|timeout| Instant::now() + timeout);
        if !self.orchestrator.wait(request, self.wait_timeout) {
            return Err(timed_out(request, self.wait_timeout));
        }
        // Cancelled requests leave Active before their outcome is published.
        let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        request.wait_settled(remaining).ok_or_else(|| timed_out(request, self.wait_timeout))
    }

    async fn run_async(&self, request: &Request) -> Result<RequestOutcome> {
        self.start_request(request)?;
        match self.wait_timeout {
            Some(timeout) => tokio::time::timeout(timeout, request.settled())
                .await
                .map_err(|_| timed_out(request, Some(timeout))),
            None => Ok(request.settled().await),
        }
    }
}

impl Drop for CalendarBackend {
    fn drop(&mut self) {
        if !self.orchestrator.lifecycle().is_draining() {
            debug!("calendar backend dropped; draining");
            self.orchestrator.shutdown();
        }
    }
}

fn save_request(items: Vec<CalendarItem>, mode: Option<EditMode>) -> Request {
    match mode {
        Some(mode) => Request::save_with_mode(items, mode),
        None => Request::save(items),
    }
}

fn timed_out(request: &Request, timeout: Option<Duration>) -> CalbridgeError {
    CalbridgeError::Timeout(format!(
        "request {} still {} after {:?}",
        request.id(),
        request.state(),
        timeout.unwrap_or_default()
    ))
}
