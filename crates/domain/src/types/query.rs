//! Query shapes accepted by the query entry point

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{CollectionId, ItemId};

/// Half-open time window `[start, end)`; a missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start: Some(start), end: Some(end) }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

/// Restricts which collections a query looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    /// `None` means every collection.
    pub collections: Option<BTreeSet<CollectionId>>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn collections(ids: impl IntoIterator<Item = CollectionId>) -> Self {
        Self { collections: Some(ids.into_iter().collect()) }
    }

    pub fn accepts(&self, collection: &CollectionId) -> bool {
        self.collections.as_ref().map_or(true, |set| set.contains(collection))
    }
}

/// One query request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ItemQuery {
    /// Items and expanded occurrences inside a window.
    Range { filter: ItemFilter, window: TimeWindow, limit: Option<usize> },
    /// Occurrences of a single series inside a window.
    Occurrences { master: ItemId, window: TimeWindow, limit: Option<usize> },
    /// Direct lookup; failures are reported per input index.
    ByIds { ids: Vec<ItemId> },
}

impl ItemQuery {
    pub fn range(filter: ItemFilter, window: TimeWindow) -> Self {
        Self::Range { filter, window, limit: None }
    }

    pub fn occurrences(master: ItemId, window: TimeWindow) -> Self {
        Self::Occurrences { master, window, limit: None }
    }

    pub fn by_ids(ids: Vec<ItemId>) -> Self {
        Self::ByIds { ids }
    }

    pub fn with_limit(self, limit: usize) -> Self {
        match self {
            Self::Range { filter, window, .. } => Self::Range { filter, window, limit: Some(limit) },
            Self::Occurrences { master, window, .. } => {
                Self::Occurrences { master, window, limit: Some(limit) }
            }
            other @ Self::ByIds { .. } => other,
        }
    }
}
