//! In-memory calendar store
//!
//! Keeps one master record per series, plus the series' exception records
//! (keyed by the original start of the occurrence they override) and the
//! starts of removed occurrences. Recurrence is never materialised; the
//! query engine expands masters on read.
//!
//! Every mutating call honours its cancellation token: a signalled token
//! fails the call with [`StoreError::Cancelled`] before anything is written.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use calbridge_core::{
    CalendarStore, ItemUpdate, MasterRef, RecurrenceExpander, SavedItem, SessionRef, StoreResult,
};
use calbridge_domain::{
    CalendarItem, CollectionId, EditMode, ItemFilter, ItemId, ItemKind, OccurrenceParent,
    RecurrenceLimit, StoreError, StoredSeries, TimeWindow,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::recurrence::RuleExpander;

#[derive(Debug, Default)]
struct CollectionState {
    locked: bool,
    series: BTreeMap<String, SeriesRecord>,
}

#[derive(Debug, Clone)]
struct SeriesRecord {
    master: CalendarItem,
    exceptions: BTreeMap<DateTime<Utc>, CalendarItem>,
    excluded: BTreeSet<DateTime<Utc>>,
}

impl SeriesRecord {
    fn new(master: CalendarItem) -> Self {
        Self { master, exceptions: BTreeMap::new(), excluded: BTreeSet::new() }
    }

    fn snapshot(&self) -> StoredSeries {
        StoredSeries {
            master: self.master.clone(),
            exceptions: self.exceptions.values().cloned().collect(),
            excluded: self.excluded.clone(),
        }
    }

    fn master_id(&self) -> StoreResult<ItemId> {
        self.master.id.clone().ok_or_else(|| StoreError::Backend("record without identity".into()))
    }

    /// True when the series has a live occurrence originally starting at `at`.
    fn has_occurrence(&self, expander: &RuleExpander, at: DateTime<Utc>) -> bool {
        if self.excluded.contains(&at) {
            return false;
        }
        if self.exceptions.contains_key(&at) {
            return true;
        }
        let (Some(rule), Some(start)) = (&self.master.recurrence, self.master.start) else {
            return false;
        };
        let instant = TimeWindow::new(at, at + Duration::seconds(1));
        expander.expand(rule, start, self.master.zone(), &instant, 1).contains(&at)
    }

    fn require_occurrence(&self, expander: &RuleExpander, at: DateTime<Utc>) -> StoreResult<ItemId> {
        let master_id = self.master_id()?;
        if self.has_occurrence(expander, at) {
            Ok(master_id)
        } else {
            Err(StoreError::NotFound(master_id.occurrence(at).to_string()))
        }
    }

    /// Create or replace the exception for the occurrence starting at `at`.
    fn store_exception(
        &mut self,
        expander: &RuleExpander,
        at: DateTime<Utc>,
        item: CalendarItem,
    ) -> StoreResult<CalendarItem> {
        let master_id = self.require_occurrence(expander, at)?;
        let exception = as_exception(item, &master_id, at);
        self.exceptions.insert(at, exception.clone());
        Ok(exception)
    }

    /// Replace the record addressed by its own id.
    fn rewrite(&mut self, item: CalendarItem) -> StoreResult<CalendarItem> {
        let master_id = self.master_id()?;
        let delta = match (self.master.start, item.start) {
            (Some(old), Some(new)) => new - old,
            _ => Duration::zero(),
        };
        let previous = std::mem::replace(
            &mut self.master,
            CalendarItem { id: Some(master_id), parent: None, ..item },
        );
        if self.master.recurrence.is_none() {
            self.exceptions.clear();
            self.excluded.clear();
        } else {
            self.propagate_text(&previous);
            self.shift(delta)?;
        }
        Ok(self.master.clone())
    }

    /// Apply an occurrence edit to the whole series.
    ///
    /// The time change of the edited occurrence moves the master and every
    /// exception; the exception of the edited occurrence itself is dropped.
    /// A changed label or description replaces the one on every exception.
    fn apply_to_all(
        &mut self,
        expander: &RuleExpander,
        at: DateTime<Utc>,
        item: &CalendarItem,
    ) -> StoreResult<CalendarItem> {
        self.require_occurrence(expander, at)?;
        let delta = item.start.map_or_else(Duration::zero, |start| start - at);
        let duration = item.duration().or_else(|| self.master.duration());
        let previous = self.master.clone();

        self.master.display_label = item.display_label.clone();
        self.master.description = item.description.clone();
        self.master.time_zone = item.time_zone.or(self.master.time_zone);
        self.master.start = self.master.start.map(|start| start + delta);
        self.master.end = self.master.start.zip(duration).map(|(start, d)| start + d);

        self.exceptions.remove(&at);
        self.propagate_text(&previous);
        self.shift(delta)?;
        Ok(self.master.clone())
    }

    /// Overwrite exception fields the master changed relative to `previous`.
    ///
    /// Exception fields the series edit left alone keep their override.
    fn propagate_text(&mut self, previous: &CalendarItem) {
        let label_changed = self.master.display_label != previous.display_label;
        let description_changed = self.master.description != previous.description;
        if !label_changed && !description_changed {
            return;
        }
        for exception in self.exceptions.values_mut() {
            if label_changed {
                exception.display_label.clone_from(&self.master.display_label);
            }
            if description_changed {
                exception.description.clone_from(&self.master.description);
            }
        }
    }

    /// Move exception keys and excluded starts by `delta`.
    fn shift(&mut self, delta: Duration) -> StoreResult<()> {
        if delta.is_zero() {
            return Ok(());
        }
        let master_id = self.master_id()?;
        self.exceptions = std::mem::take(&mut self.exceptions)
            .into_iter()
            .map(|(at, exception)| (at + delta, as_exception(exception, &master_id, at + delta)))
            .collect();
        self.excluded = std::mem::take(&mut self.excluded).into_iter().map(|at| at + delta).collect();
        Ok(())
    }
}

/// `item` re-homed as the exception of `master_id` at `original_start`.
fn as_exception(item: CalendarItem, master_id: &ItemId, original_start: DateTime<Utc>) -> CalendarItem {
    CalendarItem {
        id: Some(master_id.occurrence(original_start)),
        collection_id: master_id.collection_id().clone(),
        kind: ItemKind::EventOccurrence,
        recurrence: None,
        parent: Some(OccurrenceParent { master_id: master_id.clone(), original_start }),
        ..item
    }
}

impl CollectionState {
    fn record_mut(&mut self, id: &ItemId) -> StoreResult<&mut SeriesRecord> {
        self.series.get_mut(id.uid()).ok_or_else(|| StoreError::NotFound(id.master().to_string()))
    }

    /// Truncate the series before `at` and continue it as a new series.
    ///
    /// Exceptions and removed starts at or after `at` move to the new series.
    /// Splitting at the first occurrence edits the whole series instead.
    fn split_series(
        &mut self,
        expander: &RuleExpander,
        id: &ItemId,
        at: DateTime<Utc>,
        item: &CalendarItem,
    ) -> StoreResult<SavedItem> {
        let record = self.record_mut(id)?;
        let original_id = record.require_occurrence(expander, at)?;
        let (Some(rule), Some(series_start)) = (record.master.recurrence.clone(), record.master.start)
        else {
            return Err(StoreError::InvalidItem(format!("{original_id} does not recur")));
        };

        let zone = record.master.zone();
        let before = expander.count_before(&rule, series_start, zone, at);
        if before == 0 {
            return record.apply_to_all(expander, at, item).map(SavedItem::updated);
        }
        let before = u32::try_from(before).unwrap_or(u32::MAX);

        let mut head_rule = rule.clone();
        let mut tail_rule = rule;
        match tail_rule.limit {
            Some(RecurrenceLimit::Count(total)) => {
                head_rule.limit = Some(RecurrenceLimit::Count(before));
                tail_rule.limit = Some(RecurrenceLimit::Count(total.saturating_sub(before).max(1)));
            }
            _ => {
                let last_day = at.with_timezone(&zone).date_naive() - Duration::days(1);
                head_rule.limit = Some(RecurrenceLimit::Until(last_day));
            }
        }

        let delta = item.start.map_or_else(Duration::zero, |start| start - at);
        let duration = item.duration().or_else(|| record.master.duration());
        let tail_start = at + delta;
        let tail_id = ItemId::new(id.collection_id().clone(), Uuid::new_v4().to_string());

        let mut tail = SeriesRecord::new(CalendarItem {
            id: Some(tail_id.clone()),
            collection_id: id.collection_id().clone(),
            kind: record.master.kind,
            display_label: item.display_label.clone(),
            description: item.description.clone(),
            start: Some(tail_start),
            end: duration.map(|d| tail_start + d),
            time_zone: item.time_zone.or(record.master.time_zone),
            recurrence: Some(tail_rule),
            parent: None,
        });
        let mut moved = record.exceptions.split_off(&at);
        moved.remove(&at);
        tail.exceptions = moved
            .into_iter()
            .map(|(start, exception)| {
                (start + delta, as_exception(exception, &tail_id, start + delta))
            })
            .collect();
        tail.excluded = record.excluded.split_off(&at).into_iter().map(|s| s + delta).collect();
        record.master.recurrence = Some(head_rule);

        debug!(original = %original_id, split = %tail_id, at = %at, "series split");
        let saved = SavedItem {
            item: tail.master.clone(),
            created: true,
            also_changed: vec![original_id],
        };
        self.series.insert(tail_id.uid().to_string(), tail);
        Ok(saved)
    }
}

/// Master+exception calendar store held in memory.
///
/// Collections must be registered before sessions can be opened on them; a
/// locked collection refuses new sessions with [`StoreError::Locked`].
#[derive(Debug, Default)]
pub struct InMemoryCalendarStore {
    collections: RwLock<HashMap<CollectionId, CollectionState>>,
    expander: RuleExpander,
    latency: StdDuration,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `collection` while building the store.
    #[must_use]
    pub fn with_collection(self, collection: impl Into<CollectionId>) -> Self {
        self.add_collection(collection);
        self
    }

    /// Delay every per-item call by `latency` (cancellable).
    #[must_use]
    pub fn with_latency(mut self, latency: StdDuration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns false when the collection already existed.
    pub fn add_collection(&self, collection: impl Into<CollectionId>) -> bool {
        let collection = collection.into();
        let mut collections = self.collections.write();
        if collections.contains_key(&collection) {
            return false;
        }
        collections.insert(collection, CollectionState::default());
        true
    }

    /// Returns false for unknown collections.
    pub fn set_locked(&self, collection: &CollectionId, locked: bool) -> bool {
        match self.collections.write().get_mut(collection) {
            Some(state) => {
                state.locked = locked;
                true
            }
            None => false,
        }
    }

    pub fn collections(&self) -> Vec<CollectionId> {
        let mut ids: Vec<CollectionId> = self.collections.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of stored series across all collections.
    pub fn series_count(&self) -> usize {
        self.collections.read().values().map(|state| state.series.len()).sum()
    }

    async fn pause(&self, cancel: &CancellationToken) -> StoreResult<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.latency.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = cancel.cancelled() => Err(StoreError::Cancelled),
            () = tokio::time::sleep(self.latency) => Ok(()),
        }
    }

    fn with_state<T>(
        &self,
        session: &SessionRef,
        f: impl FnOnce(&mut CollectionState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(session.collection_id())
            .ok_or_else(|| StoreError::NotFound(session.collection_id().to_string()))?;
        f(state)
    }
}

fn check_collection(session: &SessionRef, collection: &CollectionId) -> StoreResult<()> {
    if session.collection_id() == collection {
        Ok(())
    } else {
        Err(StoreError::InvalidItem(format!(
            "item of collection {collection} in session {session}"
        )))
    }
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn begin_session(&self, collection: &CollectionId) -> StoreResult<SessionRef> {
        match self.collections.read().get(collection) {
            None => Err(StoreError::NotFound(collection.to_string())),
            Some(state) if state.locked => Err(StoreError::Locked(collection.to_string())),
            Some(_) => {
                let session = SessionRef::new(collection.clone());
                debug!(%session, "session opened");
                Ok(session)
            }
        }
    }

    async fn create_item(
        &self,
        session: &SessionRef,
        item: CalendarItem,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem> {
        self.pause(cancel).await?;
        check_collection(session, &item.collection_id)?;

        self.with_state(session, |state| {
            if item.kind == ItemKind::EventOccurrence {
                let parent = item
                    .parent
                    .clone()
                    .ok_or_else(|| StoreError::InvalidItem("occurrence without parent".into()))?;
                let record = state.record_mut(&parent.master_id)?;
                let exception = record.store_exception(&self.expander, parent.original_start, item)?;
                return Ok(SavedItem::updated(exception));
            }

            let id = ItemId::new(session.collection_id().clone(), Uuid::new_v4().to_string());
            let stored = CalendarItem { parent: None, ..item.with_id(id.clone()) };
            state.series.insert(id.uid().to_string(), SeriesRecord::new(stored.clone()));
            debug!(%id, "item created");
            Ok(SavedItem::created(stored))
        })
    }

    async fn update_item(
        &self,
        session: &SessionRef,
        update: ItemUpdate,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem> {
        self.pause(cancel).await?;
        let id = update
            .item
            .id
            .clone()
            .ok_or_else(|| StoreError::InvalidItem("update without identity".into()))?;
        check_collection(session, id.collection_id())?;
        if let Some(master) = &update.master {
            if master.master_id != id.master() {
                return Err(StoreError::InvalidItem(format!(
                    "{id} does not belong to {}",
                    master.master_id
                )));
            }
        }

        let ItemUpdate { item, mode, .. } = update;
        self.with_state(session, |state| {
            let saved = match (mode, id.recurrence_id()) {
                (_, None) => SavedItem::updated(state.record_mut(&id)?.rewrite(item)?),
                (EditMode::ThisOccurrence, Some(at)) => SavedItem::updated(
                    state.record_mut(&id)?.store_exception(&self.expander, at, item)?,
                ),
                (EditMode::AllOccurrences, Some(at)) => SavedItem::updated(
                    state.record_mut(&id)?.apply_to_all(&self.expander, at, &item)?,
                ),
                (EditMode::ThisAndFollowing, Some(at)) => {
                    state.split_series(&self.expander, &id, at, &item)?
                }
            };
            debug!(%id, %mode, created = saved.created, "item updated");
            Ok(saved)
        })
    }

    async fn remove_item(
        &self,
        session: &SessionRef,
        id: &ItemId,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.pause(cancel).await?;
        check_collection(session, id.collection_id())?;

        self.with_state(session, |state| {
            match id.recurrence_id() {
                None => {
                    state
                        .series
                        .remove(id.uid())
                        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                }
                Some(at) => {
                    let record = state.record_mut(id)?;
                    record.require_occurrence(&self.expander, at)?;
                    record.exceptions.remove(&at);
                    record.excluded.insert(at);
                }
            }
            debug!(%id, "item removed");
            Ok(())
        })
    }

    async fn resolve_master(&self, session: &SessionRef, id: &ItemId) -> StoreResult<MasterRef> {
        check_collection(session, id.collection_id())?;
        let collections = self.collections.read();
        let record = collections
            .get(id.collection_id())
            .and_then(|state| state.series.get(id.uid()))
            .ok_or_else(|| StoreError::NotFound(id.master().to_string()))?;
        let series_start = record
            .master
            .start
            .ok_or_else(|| StoreError::InvalidItem(format!("{} has no start", id.master())))?;
        Ok(MasterRef {
            master_id: record.master_id()?,
            series_start,
            rule: record.master.recurrence.clone(),
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
        let collections = self.collections.read();
        let mut series: Vec<StoredSeries> = collections
            .iter()
            .filter(|(collection, _)| filter.accepts(collection))
            .flat_map(|(_, state)| state.series.values().map(SeriesRecord::snapshot))
            .collect();
        series.sort_by(|a, b| a.master.id.cmp(&b.master.id));
        Ok(series)
    }

    async fn fetch_one(&self, master: &ItemId, cancel: &CancellationToken) -> StoreResult<StoredSeries> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.collections
            .read()
            .get(master.collection_id())
            .and_then(|state| state.series.get(master.uid()))
            .map(SeriesRecord::snapshot)
            .ok_or_else(|| StoreError::NotFound(master.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use calbridge_domain::RecurrenceRule;
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn weekly(count: u32) -> CalendarItem {
        // 2024-03-04 is a Monday.
        CalendarItem::event("work", "Standup")
            .with_times(at(4), at(4) + Duration::minutes(30))
            .with_recurrence(RecurrenceRule::weekly().count(count))
    }

    async fn seeded(item: CalendarItem) -> (InMemoryCalendarStore, SessionRef, ItemId) {
        let store = InMemoryCalendarStore::new().with_collection("work");
        let session = store.begin_session(&CollectionId::new("work")).await.unwrap();
        let saved = store.create_item(&session, item, &CancellationToken::new()).await.unwrap();
        let id = saved.item.id.unwrap();
        (store, session, id)
    }

    fn occurrence_update(id: &ItemId, start: DateTime<Utc>, label: &str, mode: EditMode) -> ItemUpdate {
        let item = CalendarItem::event("work", label)
            .with_times(start, start + Duration::minutes(30))
            .with_id(id.occurrence(start));
        ItemUpdate { item, mode, master: None }
    }

    #[tokio::test]
    async fn sessions_require_known_unlocked_collections() {
        let store = InMemoryCalendarStore::new().with_collection("work");
        let unknown = store.begin_session(&CollectionId::new("home")).await;
        assert!(matches!(unknown, Err(StoreError::NotFound(_))));

        assert!(store.set_locked(&CollectionId::new("work"), true));
        let locked = store.begin_session(&CollectionId::new("work")).await;
        assert!(matches!(locked, Err(StoreError::Locked(_))));
    }

    #[tokio::test]
    async fn create_assigns_identity_in_session_collection() {
        let (store, _session, id) = seeded(weekly(3)).await;
        assert_eq!(id.collection_id().as_str(), "work");
        assert!(!id.is_occurrence());
        assert_eq!(store.series_count(), 1);
    }

    #[tokio::test]
    async fn signalled_token_prevents_the_write() {
        let store = InMemoryCalendarStore::new().with_collection("work");
        let session = store.begin_session(&CollectionId::new("work")).await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = store.create_item(&session, weekly(3), &token).await;
        assert_eq!(result, Err(StoreError::Cancelled));
        assert_eq!(store.series_count(), 0);
    }

    #[tokio::test]
    async fn this_occurrence_update_stores_an_exception() {
        let (store, session, id) = seeded(weekly(3)).await;
        let update = occurrence_update(&id, at(11), "Moved", EditMode::ThisOccurrence);
        store.update_item(&session, update, &CancellationToken::new()).await.unwrap();

        let series = store.fetch_one(&id, &CancellationToken::new()).await.unwrap();
        let exception = series.exception_for(at(11)).unwrap();
        assert_eq!(exception.display_label, "Moved");
        assert_eq!(exception.kind, ItemKind::EventOccurrence);
        assert_eq!(series.master.display_label, "Standup");
    }

    #[tokio::test]
    async fn updating_a_date_outside_the_series_is_not_found() {
        let (store, session, id) = seeded(weekly(3)).await;
        let update = occurrence_update(&id, at(12), "Nope", EditMode::ThisOccurrence);
        let result = store.update_item(&session, update, &CancellationToken::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn removing_an_occurrence_excludes_it_once() {
        let (store, session, id) = seeded(weekly(3)).await;
        let token = CancellationToken::new();
        store.remove_item(&session, &id.occurrence(at(11)), &token).await.unwrap();

        let series = store.fetch_one(&id, &token).await.unwrap();
        assert!(series.excluded.contains(&at(11)));

        let again = store.remove_item(&session, &id.occurrence(at(11)), &token).await;
        assert!(matches!(again, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn all_occurrences_moves_the_series() {
        let (store, session, id) = seeded(weekly(3)).await;
        let token = CancellationToken::new();
        let moved = at(11) + Duration::hours(2);
        let mut update = occurrence_update(&id, moved, "Later", EditMode::AllOccurrences);
        update.item.id = Some(id.occurrence(at(11)));

        let saved = store.update_item(&session, update, &token).await.unwrap();
        assert!(!saved.created);
        assert_eq!(saved.item.start, Some(at(4) + Duration::hours(2)));
        assert_eq!(saved.item.display_label, "Later");
        assert!(saved.item.recurrence.is_some());
    }

    #[tokio::test]
    async fn series_edits_overwrite_the_changed_fields_of_exceptions() {
        let (store, session, id) = seeded(weekly(3)).await;
        let token = CancellationToken::new();
        let mut single = occurrence_update(&id, at(11), "Only this", EditMode::ThisOccurrence);
        single.item.description = Some("kept".into());
        store.update_item(&session, single, &token).await.unwrap();

        let all = occurrence_update(&id, at(18), "Everyone", EditMode::AllOccurrences);
        store.update_item(&session, all, &token).await.unwrap();

        let series = store.fetch_one(&id, &token).await.unwrap();
        let exception = series.exception_for(at(11)).unwrap();
        assert_eq!(exception.display_label, "Everyone");
        assert_eq!(exception.description.as_deref(), Some("kept"));

        let mut master = series.master.clone();
        master.display_label = "Renamed master".into();
        let rewrite = ItemUpdate { item: master, mode: EditMode::AllOccurrences, master: None };
        store.update_item(&session, rewrite, &token).await.unwrap();

        let series = store.fetch_one(&id, &token).await.unwrap();
        assert_eq!(series.exception_for(at(11)).unwrap().display_label, "Renamed master");
    }

    #[tokio::test]
    async fn this_and_following_splits_a_counted_series() {
        let (store, session, id) = seeded(weekly(5)).await;
        let token = CancellationToken::new();
        let update = occurrence_update(&id, at(18), "Renamed", EditMode::ThisAndFollowing);

        let saved = store.update_item(&session, update, &token).await.unwrap();
        assert!(saved.created);
        assert_eq!(saved.also_changed, vec![id.clone()]);
        assert_eq!(saved.item.recurrence.as_ref().and_then(RecurrenceRule::limit_count), Some(3));

        let head = store.fetch_one(&id, &token).await.unwrap();
        assert_eq!(head.master.recurrence.as_ref().and_then(RecurrenceRule::limit_count), Some(2));
        assert_eq!(store.series_count(), 2);
    }

    #[tokio::test]
    async fn this_and_following_truncates_an_until_series_the_day_before() {
        let until = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let item = CalendarItem::event("work", "Standup")
            .with_times(at(4), at(4) + Duration::minutes(30))
            .with_recurrence(RecurrenceRule::weekly().until(until));
        let (store, session, id) = seeded(item).await;
        let token = CancellationToken::new();

        let update = occurrence_update(&id, at(18), "Renamed", EditMode::ThisAndFollowing);
        store.update_item(&session, update, &token).await.unwrap();

        let head = store.fetch_one(&id, &token).await.unwrap();
        let limit = head.master.recurrence.and_then(|rule| rule.limit_date());
        assert_eq!(limit, NaiveDate::from_ymd_opt(2024, 3, 17));
    }

    #[tokio::test]
    async fn this_and_following_at_the_first_occurrence_edits_everything() {
        let (store, session, id) = seeded(weekly(5)).await;
        let update = occurrence_update(&id, at(4), "Renamed", EditMode::ThisAndFollowing);

        let saved = store.update_item(&session, update, &CancellationToken::new()).await.unwrap();
        assert!(!saved.created);
        assert_eq!(saved.item.id, Some(id));
        assert_eq!(store.series_count(), 1);
    }

    #[tokio::test]
    async fn fetch_series_honours_the_filter() {
        let store = InMemoryCalendarStore::new().with_collection("work").with_collection("home");
        let token = CancellationToken::new();
        for collection in ["work", "home"] {
            let session = store.begin_session(&CollectionId::new(collection)).await.unwrap();
            let item = CalendarItem::event(collection, "x").with_times(at(4), at(4));
            store.create_item(&session, item, &token).await.unwrap();
        }

        let filter = ItemFilter::collections([CollectionId::new("home")]);
        let series = store.fetch_series(&filter, &token).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].master.collection_id.as_str(), "home");
        assert_eq!(store.fetch_series(&ItemFilter::all(), &token).await.unwrap().len(), 2);
    }
}
