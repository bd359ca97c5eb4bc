//! Request orchestration: registration, per-collection dispatch and
//! finalisation.
//!
//! Each started request is driven by one spawned task. That task is the
//! only writer of the request's aggregator; store calls for a collection are
//! issued concurrently and their completions are folded in as they arrive.

use std::sync::Arc;
use std::time::Duration;

use calbridge_domain::{
    impl_domain_status_conversions, BackendConfig, CalendarItem, CollectionId, Config, EditMode,
    ErrorKind, ItemId, ItemQuery, QueryConfig, RequestOutcome, RequestState, Result,
};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use super::aggregator::ResultAggregator;
use super::batcher::{CollectionBatch, CollectionKeyed, Indexed};
use super::handle::OperationHandle;
use super::lifecycle::RequestLifecycle;
use super::splitter::{prepare_update, OccurrenceSplitter, SplitItems};
use super::{Request, RequestId, RequestPayload};
use crate::calendar_ports::{
    CalendarStore, ChangeSink, RecurrenceExpander, SavedItem, SessionRef, StoreResult,
};
use crate::query::QueryEngine;

/// Internal progress of the task driving one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    Activating,
    BatchingCollections,
    ProcessingCollection,
    AdvancingCollection,
    Aggregating,
    Finished,
    Cancelled,
}

impl_domain_status_conversions!(OrchestratorPhase {
    Activating => "activating",
    BatchingCollections => "batching_collections",
    ProcessingCollection => "processing_collection",
    AdvancingCollection => "advancing_collection",
    Aggregating => "aggregating",
    Finished => "finished",
    Cancelled => "cancelled",
});

struct PhaseTracker {
    request_id: RequestId,
    phase: OrchestratorPhase,
}

impl PhaseTracker {
    fn new(request_id: RequestId) -> Self {
        Self { request_id, phase: OrchestratorPhase::Activating }
    }

    fn advance(&mut self, next: OrchestratorPhase) {
        debug!(request_id = %self.request_id, from = %self.phase, to = %next, "orchestrator phase");
        self.phase = next;
    }
}

/// Where a collection's items fail before any per-item call is made.
#[derive(Debug, Default)]
struct StructuralFailures {
    attempted: bool,
    first_error: Option<ErrorKind>,
}

impl StructuralFailures {
    /// Overall error: only set when nothing could be attempted.
    fn overall(&self) -> ErrorKind {
        if self.attempted {
            ErrorKind::NoError
        } else {
            self.first_error.unwrap_or(ErrorKind::NoError)
        }
    }
}

/// Collaborators shared between the orchestrator and its tasks.
struct DriveContext {
    store: Arc<dyn CalendarStore>,
    expander: Arc<dyn RecurrenceExpander>,
    sink: Arc<dyn ChangeSink>,
    backend: BackendConfig,
    query: QueryConfig,
}

/// Starts, cancels and waits on requests.
pub struct RequestOrchestrator {
    context: Arc<DriveContext>,
    lifecycle: RequestLifecycle,
    runtime: Handle,
}

impl RequestOrchestrator {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        expander: Arc<dyn RecurrenceExpander>,
        sink: Arc<dyn ChangeSink>,
        config: &Config,
        runtime: Handle,
    ) -> Self {
        let context = DriveContext {
            store,
            expander,
            sink,
            backend: config.backend.clone(),
            query: config.query.clone(),
        };
        Self {
            context: Arc::new(context),
            lifecycle: RequestLifecycle::new(config.backend.shutdown_policy),
            runtime,
        }
    }

    /// Replace the lifecycle, e.g. to share a live-handle counter.
    pub fn with_lifecycle(mut self, lifecycle: RequestLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    /// Register `request` and spawn the task driving it.
    #[instrument(skip_all, fields(request_id = %request.id(), kind = %request.kind()))]
    pub fn start(&self, request: &Request) -> Result<Arc<OperationHandle>> {
        let handle = self.lifecycle.register(request)?;
        info!(inputs = request.payload().input_len(), "request started");

        let context = Arc::clone(&self.context);
        let payload = request.shared_payload();
        let task_handle = Arc::clone(&handle);
        self.runtime.spawn(async move {
            context.drive(task_handle, payload).await;
        });
        Ok(handle)
    }

    /// Cancel a request. No-op unless the request is active.
    pub fn cancel(&self, request: &Request) -> bool {
        match self.lifecycle.handle(request.id()) {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }

    /// Block until `request` leaves `Active` or `timeout` elapses.
    ///
    /// Returns true when the request is no longer active.
    pub fn wait(&self, request: &Request, timeout: Option<Duration>) -> bool {
        match self.lifecycle.handle(request.id()) {
            Some(handle) => handle.wait(timeout),
            None => request.state().is_terminal(),
        }
    }

    /// Drain: refuse new work and cancel everything in flight.
    pub fn shutdown(&self) -> usize {
        self.lifecycle.cancel_all()
    }

    pub fn live_requests(&self) -> usize {
        self.lifecycle.live_count()
    }
}

impl DriveContext {
    async fn drive(&self, handle: Arc<OperationHandle>, payload: Arc<RequestPayload>) {
        let mut phase = PhaseTracker::new(handle.request_id());
        let outcome = match payload.as_ref() {
            RequestPayload::Save { items, edit_mode } => {
                self.run_save(&handle, &mut phase, items, *edit_mode).await
            }
            RequestPayload::Remove { ids } => self.run_remove(&handle, &mut phase, ids).await,
            RequestPayload::Query(query) => self.run_query(&handle, &mut phase, query).await,
        };

        let cancelled = handle.state() == RequestState::Cancelled;
        phase.advance(if cancelled { OrchestratorPhase::Cancelled } else { OrchestratorPhase::Finished });
        info!(
            request_id = %handle.request_id(),
            error_kind = %outcome.error,
            failed = outcome.error_map.len(),
            cancelled,
            "request completed"
        );

        if !outcome.change_set.is_empty() {
            self.sink.publish(&outcome.change_set);
        }
        handle.complete(outcome);
    }

    async fn run_save(
        &self,
        handle: &OperationHandle,
        phase: &mut PhaseTracker,
        items: &[CalendarItem],
        hint: Option<EditMode>,
    ) -> RequestOutcome {
        let mut aggregator = ResultAggregator::new(items.len());
        let mut structural = StructuralFailures::default();

        phase.advance(OrchestratorPhase::BatchingCollections);
        let mut batch = CollectionBatch::partition(items.iter().cloned());

        while let Some((collection, entries)) = batch.take_next() {
            if handle.is_finished() {
                break;
            }
            phase.advance(OrchestratorPhase::ProcessingCollection);
            let Some(session) =
                self.open_session(handle, &collection, &entries, &mut aggregator, &mut structural).await
            else {
                phase.advance(OrchestratorPhase::AdvancingCollection);
                continue;
            };

            let splitter = OccurrenceSplitter::new(entries, hint, self.backend.default_edit_mode);
            self.save_collection(handle, &session, splitter, &mut aggregator).await;
            phase.advance(OrchestratorPhase::AdvancingCollection);
        }

        phase.advance(OrchestratorPhase::Aggregating);
        self.finalize(handle, aggregator, &structural)
    }

    async fn save_collection(
        &self,
        handle: &OperationHandle,
        session: &SessionRef,
        mut splitter: OccurrenceSplitter,
        aggregator: &mut ResultAggregator,
    ) {
        let store = self.store.as_ref();
        let token = handle.cancellation_token();
        let SplitItems { to_create, to_update } = splitter.split();

        let mut calls: FuturesUnordered<BoxFuture<'_, (usize, StoreResult<SavedItem>)>> =
            FuturesUnordered::new();

        for Indexed { index, value } in to_create {
            if let Err(kind) = value.validate() {
                aggregator.record_failure(index, kind);
                continue;
            }
            calls.push(async move { (index, store.create_item(session, value, token).await) }.boxed());
        }

        for Indexed { index, value } in to_update {
            if let Err(kind) = value.validate() {
                aggregator.record_failure(index, kind);
                continue;
            }
            let mode = splitter.mode_for(&value);
            calls.push(
                async move {
                    let result = match prepare_update(store, session, value, mode).await {
                        Ok(update) => store.update_item(session, update, token).await,
                        Err(err) => Err(err),
                    };
                    (index, result)
                }
                .boxed(),
            );
        }

        while let Some((index, result)) = calls.next().await {
            if handle.is_finished() {
                debug!(request_id = %handle.request_id(), index, "completion after cancel ignored");
                continue;
            }
            match result {
                Ok(saved) => aggregator.record_saved(index, saved),
                Err(err) => {
                    warn!(request_id = %handle.request_id(), index, error = %err, "save failed");
                    aggregator.record_failure(index, err.kind());
                }
            }
        }
    }

    async fn run_remove(
        &self,
        handle: &OperationHandle,
        phase: &mut PhaseTracker,
        ids: &[ItemId],
    ) -> RequestOutcome {
        let mut aggregator = ResultAggregator::new(ids.len());
        let mut structural = StructuralFailures::default();

        phase.advance(OrchestratorPhase::BatchingCollections);
        let mut batch = CollectionBatch::partition(ids.iter().cloned());

        while let Some((collection, entries)) = batch.take_next() {
            if handle.is_finished() {
                break;
            }
            phase.advance(OrchestratorPhase::ProcessingCollection);
            let Some(session) =
                self.open_session(handle, &collection, &entries, &mut aggregator, &mut structural).await
            else {
                phase.advance(OrchestratorPhase::AdvancingCollection);
                continue;
            };

            let store = self.store.as_ref();
            let token = handle.cancellation_token();
            let session = &session;
            let mut calls: FuturesUnordered<BoxFuture<'_, (usize, ItemId, StoreResult<()>)>> =
                FuturesUnordered::new();
            for Indexed { index, value } in entries {
                calls.push(
                    async move {
                        let result = store.remove_item(session, &value, token).await;
                        (index, value, result)
                    }
                    .boxed(),
                );
            }

            while let Some((index, id, result)) = calls.next().await {
                if handle.is_finished() {
                    continue;
                }
                match result {
                    Ok(()) => aggregator.record_removed(index, id),
                    Err(err) => {
                        warn!(request_id = %handle.request_id(), index, %id, error = %err, "remove failed");
                        aggregator.record_failure(index, err.kind());
                    }
                }
            }
            phase.advance(OrchestratorPhase::AdvancingCollection);
        }

        phase.advance(OrchestratorPhase::Aggregating);
        self.finalize(handle, aggregator, &structural)
    }

    async fn run_query(
        &self,
        handle: &OperationHandle,
        phase: &mut PhaseTracker,
        query: &ItemQuery,
    ) -> RequestOutcome {
        let input_len = match query {
            ItemQuery::ByIds { ids } => ids.len(),
            _ => 0,
        };
        let mut aggregator = ResultAggregator::new(input_len);
        let engine = QueryEngine::new(self.store.as_ref(), self.expander.as_ref(), &self.query);

        phase.advance(OrchestratorPhase::ProcessingCollection);
        let result = engine.run(query, handle.cancellation_token()).await;
        phase.advance(OrchestratorPhase::Aggregating);

        if handle.is_finished() {
            return aggregator.finalize_cancelled();
        }
        match result {
            Ok(output) if input_len > 0 => {
                let mut found = output.items.into_iter();
                for index in 0..input_len {
                    match output.errors.get(&index) {
                        Some(kind) => aggregator.record_failure(index, *kind),
                        None => {
                            if let Some(item) = found.next() {
                                aggregator.record_fetched(index, item);
                            }
                        }
                    }
                }
                aggregator.finalize(ErrorKind::NoError)
            }
            Ok(output) => {
                aggregator.extend_items(output.items);
                aggregator.finalize(ErrorKind::NoError)
            }
            Err(err) => {
                warn!(request_id = %handle.request_id(), error = %err, "query failed");
                let kind = err.kind();
                for index in 0..input_len {
                    aggregator.record_failure(index, kind);
                }
                aggregator.finalize(kind)
            }
        }
    }

    /// Open the store session for a collection; on failure every entry of
    /// the collection is recorded with the session error.
    async fn open_session<T: CollectionKeyed>(
        &self,
        handle: &OperationHandle,
        collection: &CollectionId,
        entries: &[Indexed<T>],
        aggregator: &mut ResultAggregator,
        structural: &mut StructuralFailures,
    ) -> Option<SessionRef> {
        match self.store.begin_session(collection).await {
            Ok(session) => {
                debug!(request_id = %handle.request_id(), %session, "store session opened");
                handle.set_session(session.clone());
                structural.attempted = true;
                Some(session)
            }
            Err(_) if handle.is_finished() => None,
            Err(err) => {
                warn!(
                    request_id = %handle.request_id(),
                    %collection,
                    error = %err,
                    "could not open collection"
                );
                let kind = err.kind();
                for entry in entries {
                    aggregator.record_failure(entry.index, kind);
                }
                structural.first_error.get_or_insert(kind);
                None
            }
        }
    }

    fn finalize(
        &self,
        handle: &OperationHandle,
        aggregator: ResultAggregator,
        structural: &StructuralFailures,
    ) -> RequestOutcome {
        if handle.is_finished() {
            aggregator.finalize_cancelled()
        } else {
            aggregator.finalize(structural.overall())
        }
    }
}
