use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calbridge_core::{CalendarStore, ItemUpdate, MasterRef, SavedItem, SessionRef, StoreResult};
use calbridge_domain::{
    CalendarItem, CollectionId, EditMode, ItemFilter, ItemId, StoreError, StoredSeries,
};
use tokio_util::sync::CancellationToken;

/// In-memory `CalendarStore` with scriptable latency and failures.
///
/// - every per-item call sleeps for the collection's latency (default zero)
///   and returns `Cancelled` as soon as the token fires, unless
///   `ignore_cancel` is set, in which case the call finishes its write
/// - collections marked locked refuse `begin_session`
/// - items whose label is scripted to fail are rejected with that error
#[derive(Default)]
pub struct ScriptedStore {
    records: Mutex<HashMap<ItemId, CalendarItem>>,
    exceptions: Mutex<HashMap<ItemId, CalendarItem>>,
    latency: Mutex<HashMap<CollectionId, Duration>>,
    locked: Mutex<HashSet<CollectionId>>,
    failures: Mutex<HashMap<String, StoreError>>,
    sessions: Mutex<Vec<CollectionId>>,
    ignore_cancel: Mutex<bool>,
    next_uid: AtomicUsize,
    in_flight: AtomicUsize,
    completed_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(self: Arc<Self>, collection: &str, latency: Duration) -> Arc<Self> {
        self.latency.lock().unwrap().insert(CollectionId::new(collection), latency);
        self
    }

    pub fn with_locked(self: Arc<Self>, collection: &str) -> Arc<Self> {
        self.locked.lock().unwrap().insert(CollectionId::new(collection));
        self
    }

    pub fn with_failure(self: Arc<Self>, label: &str, error: StoreError) -> Arc<Self> {
        self.failures.lock().unwrap().insert(label.to_string(), error);
        self
    }

    pub fn ignoring_cancel(self: Arc<Self>) -> Arc<Self> {
        *self.ignore_cancel.lock().unwrap() = true;
        self
    }

    /// Insert a record directly, returning its identity.
    pub fn seed(&self, item: CalendarItem) -> CalendarItem {
        let id = self.assign_id(&item.collection_id);
        let stored = item.with_id(id.clone());
        self.records.lock().unwrap().insert(id, stored.clone());
        stored
    }

    pub fn record(&self, id: &ItemId) -> Option<CalendarItem> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Collections in the order sessions were opened.
    pub fn sessions(&self) -> Vec<CollectionId> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed_calls(&self) -> usize {
        self.completed_calls.load(Ordering::SeqCst)
    }

    fn assign_id(&self, collection: &CollectionId) -> ItemId {
        let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
        ItemId::new(collection.clone(), format!("item-{n}"))
    }

    fn scripted_failure(&self, item: &CalendarItem) -> Option<StoreError> {
        self.failures.lock().unwrap().get(&item.display_label).cloned()
    }

    /// Simulated store latency; the only await point of every call.
    async fn pause(&self, collection: &CollectionId, cancel: &CancellationToken) -> StoreResult<()> {
        let latency = self.latency.lock().unwrap().get(collection).copied().unwrap_or_default();
        let ignore_cancel = *self.ignore_cancel.lock().unwrap();

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if ignore_cancel {
            tokio::time::sleep(latency).await;
            Ok(())
        } else {
            tokio::select! {
                () = cancel.cancelled() => Err(StoreError::Cancelled),
                () = tokio::time::sleep(latency) => Ok(()),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl CalendarStore for ScriptedStore {
    async fn begin_session(&self, collection: &CollectionId) -> StoreResult<SessionRef> {
        self.sessions.lock().unwrap().push(collection.clone());
        if self.locked.lock().unwrap().contains(collection) {
            return Err(StoreError::Locked(collection.to_string()));
        }
        Ok(SessionRef::new(collection.clone()))
    }

    async fn create_item(
        &self,
        session: &SessionRef,
        item: CalendarItem,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem> {
        self.pause(session.collection_id(), cancel).await?;
        if let Some(err) = self.scripted_failure(&item) {
            return Err(err);
        }
        Ok(SavedItem::created(self.seed(item)))
    }

    async fn update_item(
        &self,
        session: &SessionRef,
        update: ItemUpdate,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem> {
        self.pause(session.collection_id(), cancel).await?;
        if let Some(err) = self.scripted_failure(&update.item) {
            return Err(err);
        }
        let Some(id) = update.item.id.clone() else {
            return Err(StoreError::InvalidItem("update without identity".into()));
        };

        let target = match (&update.master, update.mode) {
            (Some(master), EditMode::AllOccurrences | EditMode::ThisAndFollowing) => {
                master.master_id.clone()
            }
            _ => id.clone(),
        };
        if target.is_occurrence() {
            if !self.records.lock().unwrap().contains_key(&target.master()) {
                return Err(StoreError::NotFound(target.to_string()));
            }
            self.exceptions.lock().unwrap().insert(target, update.item.clone());
            return Ok(SavedItem::updated(update.item));
        }

        let mut records = self.records.lock().unwrap();
        let Some(existing) = records.get_mut(&target) else {
            return Err(StoreError::NotFound(target.to_string()));
        };
        existing.display_label = update.item.display_label.clone();
        existing.description = update.item.description.clone();
        Ok(SavedItem::updated(existing.clone()))
    }

    async fn remove_item(
        &self,
        session: &SessionRef,
        id: &ItemId,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.pause(session.collection_id(), cancel).await?;
        match self.records.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn resolve_master(&self, _session: &SessionRef, id: &ItemId) -> StoreResult<MasterRef> {
        let master_id = id.master();
        let records = self.records.lock().unwrap();
        let master = records.get(&master_id).ok_or_else(|| StoreError::NotFound(master_id.to_string()))?;
        Ok(MasterRef {
            master_id,
            series_start: master.start.unwrap_or_default(),
            rule: master.recurrence.clone(),
        })
    }

    async fn fetch_series(
        &self,
        filter: &ItemFilter,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<StoredSeries>> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let records = self.records.lock().unwrap();
        let mut series: Vec<StoredSeries> = records
            .values()
            .filter(|item| filter.accepts(&item.collection_id))
            .cloned()
            .map(StoredSeries::plain)
            .collect();
        series.sort_by(|a, b| a.master.id.cmp(&b.master.id));
        Ok(series)
    }

    async fn fetch_one(&self, master: &ItemId, cancel: &CancellationToken) -> StoreResult<StoredSeries> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.records
            .lock()
            .unwrap()
            .get(master)
            .cloned()
            .map(StoredSeries::plain)
            .ok_or_else(|| StoreError::NotFound(master.to_string()))
    }
}
