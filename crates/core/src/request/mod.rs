//! Asynchronous request lifecycle.
//!
//! A [`Request`] is owned by the caller. Starting it through the
//! [`RequestOrchestrator`] registers an [`OperationHandle`] with the
//! [`RequestLifecycle`] and runs the request on the runtime:
//!
//! ```text
//! Inactive -> Active -> Finished
//!                   \-> Cancelled
//! ```
//!
//! Save and remove requests are partitioned per collection by the
//! [`CollectionBatch`], updates are classified by the [`OccurrenceSplitter`],
//! and per-item results are folded by the [`ResultAggregator`].

mod aggregator;
mod batcher;
mod cell;
mod handle;
mod lifecycle;
mod orchestrator;
mod splitter;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use calbridge_domain::{
    CalendarItem, EditMode, ItemId, ItemQuery, RequestKind, RequestOutcome, RequestState,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use aggregator::ResultAggregator;
pub use batcher::{CollectionBatch, CollectionKeyed, Indexed};
pub(crate) use cell::RequestCell;
pub use handle::{HandlePhase, OperationHandle};
pub use lifecycle::{LiveHandleCounter, RequestLifecycle};
pub use orchestrator::{OrchestratorPhase, RequestOrchestrator};
pub use splitter::{OccurrenceSplitter, SplitItems};

/// Identity of a request, used as the lifecycle map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a request asks the store to do.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Save {
        items: Vec<CalendarItem>,
        /// Edit mode hint; `None` uses the configured default.
        edit_mode: Option<EditMode>,
    },
    Remove {
        ids: Vec<ItemId>,
    },
    Query(ItemQuery),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Save { .. } => RequestKind::Save,
            Self::Remove { .. } => RequestKind::Remove,
            Self::Query(_) => RequestKind::Query,
        }
    }

    /// Number of indexed inputs the outcome reports on.
    pub fn input_len(&self) -> usize {
        match self {
            Self::Save { items, .. } => items.len(),
            Self::Remove { ids } => ids.len(),
            Self::Query(ItemQuery::ByIds { ids }) => ids.len(),
            Self::Query(_) => 0,
        }
    }
}

/// Caller-owned request object.
///
/// Cloning yields another view of the same request; state and outcome are
/// shared.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    payload: Arc<RequestPayload>,
    cell: Arc<RequestCell>,
}

impl Request {
    pub fn new(payload: RequestPayload) -> Self {
        Self { id: RequestId::new(), payload: Arc::new(payload), cell: Arc::default() }
    }

    pub fn save(items: Vec<CalendarItem>) -> Self {
        Self::new(RequestPayload::Save { items, edit_mode: None })
    }

    pub fn save_with_mode(items: Vec<CalendarItem>, edit_mode: EditMode) -> Self {
        Self::new(RequestPayload::Save { items, edit_mode: Some(edit_mode) })
    }

    /// Save carrying the store's numeric update-mode property.
    ///
    /// Flags without a supported bit leave the mode to the configured default.
    pub fn save_with_flags(items: Vec<CalendarItem>, flags: u32) -> Self {
        Self::new(RequestPayload::Save { items, edit_mode: EditMode::from_flags(flags) })
    }

    pub fn remove(ids: Vec<ItemId>) -> Self {
        Self::new(RequestPayload::Remove { ids })
    }

    pub fn query(query: ItemQuery) -> Self {
        Self::new(RequestPayload::Query(query))
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    pub fn state(&self) -> RequestState {
        self.cell.state()
    }

    /// Published outcome, if the request has settled.
    pub fn outcome(&self) -> Option<RequestOutcome> {
        self.cell.outcome()
    }

    /// Await the published outcome.
    pub async fn settled(&self) -> RequestOutcome {
        self.cell.settled().await
    }

    /// Block until the outcome is published or `timeout` elapses.
    pub fn wait_settled(&self, timeout: Option<Duration>) -> Option<RequestOutcome> {
        self.cell.wait_outcome(timeout)
    }

    pub(crate) fn cell(&self) -> &Arc<RequestCell> {
        &self.cell
    }

    pub(crate) fn shared_payload(&self) -> Arc<RequestPayload> {
        Arc::clone(&self.payload)
    }
}
