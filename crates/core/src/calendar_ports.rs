//! Calendar store port interfaces
//!
//! The orchestration layer talks to three external collaborators, all of
//! them through the traits in this module:
//! - [`CalendarStore`]: the asynchronous, cancellable store holding master
//!   records and their exceptions
//! - [`RecurrenceExpander`]: turns a rule into occurrence start times
//! - [`ChangeSink`]: receives one change set per finalized save/remove

use std::fmt;

use async_trait::async_trait;
use calbridge_domain::{
    CalendarItem, ChangeSet, CollectionId, EditMode, ItemFilter, ItemId, RecurrenceRule,
    StoreError, StoredSeries, TimeWindow,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result type for store capability calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opaque reference to an open store session on one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionRef {
    collection_id: CollectionId,
    session_id: Uuid,
}

impl SessionRef {
    pub fn new(collection_id: CollectionId) -> Self {
        Self { collection_id, session_id: Uuid::new_v4() }
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.collection_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.collection_id, self.session_id)
    }
}

/// Master record an occurrence id resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRef {
    pub master_id: ItemId,
    pub series_start: DateTime<Utc>,
    pub rule: Option<RecurrenceRule>,
}

/// One update handed to the store, already classified by edit mode.
///
/// `master` is set for `AllOccurrences` and `ThisAndFollowing`, whose writes
/// land on the master record rather than on an expanded occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub item: CalendarItem,
    pub mode: EditMode,
    pub master: Option<MasterRef>,
}

/// Item persisted by a create or update call.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedItem {
    /// The item as stored, carrying its identity.
    pub item: CalendarItem,
    /// True when the store assigned a new identity during this call.
    pub created: bool,
    /// Other pre-existing records the call modified (e.g. the master
    /// truncated by a this-and-following edit).
    pub also_changed: Vec<ItemId>,
}

impl SavedItem {
    pub fn created(item: CalendarItem) -> Self {
        Self { item, created: true, also_changed: Vec::new() }
    }

    pub fn updated(item: CalendarItem) -> Self {
        Self { item, created: false, also_changed: Vec::new() }
    }
}

/// Asynchronous calendar store.
///
/// Every call taking a [`CancellationToken`] must fail fast with
/// [`StoreError::Cancelled`] once the token is signalled, and completes
/// exactly once either way.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Open a session on a collection; fails for unknown or busy collections.
    async fn begin_session(&self, collection: &CollectionId) -> StoreResult<SessionRef>;

    /// Persist a new item and assign its identity.
    async fn create_item(
        &self,
        session: &SessionRef,
        item: CalendarItem,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem>;

    /// Apply an update according to its edit mode.
    async fn update_item(
        &self,
        session: &SessionRef,
        update: ItemUpdate,
        cancel: &CancellationToken,
    ) -> StoreResult<SavedItem>;

    /// Remove a record, or a single occurrence when `id` has a recurrence id.
    async fn remove_item(
        &self,
        session: &SessionRef,
        id: &ItemId,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    /// Resolve an occurrence (or master) id to its master record.
    async fn resolve_master(&self, session: &SessionRef, id: &ItemId) -> StoreResult<MasterRef>;

    /// Every stored series of the collections accepted by `filter`.
    async fn fetch_series(
        &self,
        filter: &ItemFilter,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<StoredSeries>>;

    /// The stored series whose master id is `master`.
    async fn fetch_one(
        &self,
        master: &ItemId,
        cancel: &CancellationToken,
    ) -> StoreResult<StoredSeries>;
}

/// Recurrence expansion capability
pub trait RecurrenceExpander: Send + Sync {
    /// Ordered occurrence starts of `rule` inside `window`, at most `max`.
    ///
    /// `series_start` is the first occurrence; weekday and day-of-month
    /// matching happen in `zone`.
    fn expand(
        &self,
        rule: &RecurrenceRule,
        series_start: DateTime<Utc>,
        zone: Tz,
        window: &TimeWindow,
        max: usize,
    ) -> Vec<DateTime<Utc>>;
}

/// Receiver of change notifications
pub trait ChangeSink: Send + Sync {
    fn publish(&self, changes: &ChangeSet);
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChangeSink;

impl ChangeSink for NullChangeSink {
    fn publish(&self, _changes: &ChangeSet) {}
}
