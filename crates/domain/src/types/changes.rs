//! Change notifications and stored series snapshots

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{CalendarItem, ItemId};

/// Identities touched by one finalized request.
///
/// An identity appears in at most one of the three sets: added wins over
/// changed, and removed wins over both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<ItemId>,
    pub changed: BTreeSet<ItemId>,
    pub removed: BTreeSet<ItemId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_added(&mut self, id: ItemId) {
        if self.removed.contains(&id) {
            return;
        }
        self.changed.remove(&id);
        self.added.insert(id);
    }

    pub fn insert_changed(&mut self, id: ItemId) {
        if self.added.contains(&id) || self.removed.contains(&id) {
            return;
        }
        self.changed.insert(id);
    }

    pub fn insert_removed(&mut self, id: ItemId) {
        self.added.remove(&id);
        self.changed.remove(&id);
        self.removed.insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// A stored series as read back from the store: the master (or plain)
/// record, its exception records, and the starts of removed occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSeries {
    pub master: CalendarItem,
    #[serde(default)]
    pub exceptions: Vec<CalendarItem>,
    #[serde(default)]
    pub excluded: BTreeSet<DateTime<Utc>>,
}

impl StoredSeries {
    pub fn plain(master: CalendarItem) -> Self {
        Self { master, exceptions: Vec::new(), excluded: BTreeSet::new() }
    }

    /// Exception record overriding the occurrence that originally started at
    /// `original_start`.
    pub fn exception_for(&self, original_start: DateTime<Utc>) -> Option<&CalendarItem> {
        self.exceptions
            .iter()
            .find(|e| e.parent.as_ref().is_some_and(|p| p.original_start == original_start))
    }
}
