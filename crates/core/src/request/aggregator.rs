//! Folding of per-item completions into one request outcome.

use std::collections::{BTreeMap, BTreeSet};

use calbridge_domain::{CalendarItem, ChangeSet, ErrorKind, ItemId, RequestOutcome};
use tracing::{debug, warn};

use crate::calendar_ports::SavedItem;

/// Collects successes, per-index failures and touched identities.
///
/// Every input index ends up in exactly one of the success set and the error
/// map; a second report for the same index is ignored.
#[derive(Debug)]
pub struct ResultAggregator {
    input_len: usize,
    items: Vec<CalendarItem>,
    succeeded: BTreeSet<usize>,
    errors: BTreeMap<usize, ErrorKind>,
    changes: ChangeSet,
}

impl ResultAggregator {
    pub fn new(input_len: usize) -> Self {
        Self {
            input_len,
            items: Vec::new(),
            succeeded: BTreeSet::new(),
            errors: BTreeMap::new(),
            changes: ChangeSet::new(),
        }
    }

    pub fn is_accounted(&self, index: usize) -> bool {
        self.succeeded.contains(&index) || self.errors.contains_key(&index)
    }

    /// Number of inputs that have reported.
    pub fn accounted(&self) -> usize {
        self.succeeded.len() + self.errors.len()
    }

    fn claim(&mut self, index: usize) -> bool {
        if index >= self.input_len {
            warn!(index, input_len = self.input_len, "completion for unknown index");
            return false;
        }
        if self.is_accounted(index) {
            debug!(index, "duplicate completion ignored");
            return false;
        }
        true
    }

    pub fn record_saved(&mut self, index: usize, saved: SavedItem) {
        if !self.claim(index) {
            return;
        }
        if let Some(id) = saved.item.id.clone() {
            if saved.created {
                self.changes.insert_added(id);
            } else {
                self.changes.insert_changed(id);
            }
        }
        for id in saved.also_changed {
            self.changes.insert_changed(id);
        }
        self.succeeded.insert(index);
        self.items.push(saved.item);
    }

    pub fn record_removed(&mut self, index: usize, id: ItemId) {
        if !self.claim(index) {
            return;
        }
        self.changes.insert_removed(id);
        self.succeeded.insert(index);
    }

    /// Fetched item for an indexed lookup.
    pub fn record_fetched(&mut self, index: usize, item: CalendarItem) {
        if !self.claim(index) {
            return;
        }
        self.succeeded.insert(index);
        self.items.push(item);
    }

    /// Result items of an unindexed query.
    pub fn extend_items(&mut self, items: impl IntoIterator<Item = CalendarItem>) {
        self.items.extend(items);
    }

    pub fn record_failure(&mut self, index: usize, kind: ErrorKind) {
        if !self.claim(index) {
            return;
        }
        debug_assert!(kind.is_error(), "failure recorded with NoError");
        self.errors.insert(index, kind);
    }

    /// Outcome of a request that ran to completion.
    ///
    /// Indices that never reported are recorded as `Unspecified`.
    pub fn finalize(mut self, overall: ErrorKind) -> RequestOutcome {
        let missing = self.fill_unaccounted(ErrorKind::Unspecified);
        if missing > 0 {
            warn!(missing, "inputs finished without a completion");
        }
        self.into_outcome(overall)
    }

    /// Outcome of a cancelled request: work done before the cancel is kept,
    /// everything else is `Cancelled`.
    pub fn finalize_cancelled(mut self) -> RequestOutcome {
        self.fill_unaccounted(ErrorKind::Cancelled);
        self.into_outcome(ErrorKind::Cancelled)
    }

    fn fill_unaccounted(&mut self, kind: ErrorKind) -> usize {
        let missing: Vec<usize> =
            (0..self.input_len).filter(|index| !self.is_accounted(*index)).collect();
        for index in &missing {
            self.errors.insert(*index, kind);
        }
        missing.len()
    }

    fn into_outcome(self, error: ErrorKind) -> RequestOutcome {
        RequestOutcome { error, items: self.items, error_map: self.errors, change_set: self.changes }
    }
}
