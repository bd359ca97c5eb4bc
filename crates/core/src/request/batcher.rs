//! Per-collection partitioning of request inputs.

use std::collections::{HashMap, VecDeque};

use calbridge_domain::{CalendarItem, CollectionId, ItemId};

/// Anything that belongs to exactly one collection.
pub trait CollectionKeyed {
    fn collection_key(&self) -> &CollectionId;
}

impl CollectionKeyed for CalendarItem {
    fn collection_key(&self) -> &CollectionId {
        &self.collection_id
    }
}

impl CollectionKeyed for ItemId {
    fn collection_key(&self) -> &CollectionId {
        self.collection_id()
    }
}

/// A value tagged with its position in the request input.
#[derive(Debug, Clone, PartialEq)]
pub struct Indexed<T> {
    pub index: usize,
    pub value: T,
}

impl<T> Indexed<T> {
    pub fn new(index: usize, value: T) -> Self {
        Self { index, value }
    }
}

/// Input items grouped by collection, consumed one collection at a time.
///
/// Collections come out in order of first appearance; items keep their
/// relative input order inside a group.
#[derive(Debug)]
pub struct CollectionBatch<T> {
    pending: VecDeque<(CollectionId, Vec<Indexed<T>>)>,
}

impl<T: CollectionKeyed> CollectionBatch<T> {
    pub fn partition(items: impl IntoIterator<Item = T>) -> Self {
        let mut positions: HashMap<CollectionId, usize> = HashMap::new();
        let mut pending: VecDeque<(CollectionId, Vec<Indexed<T>>)> = VecDeque::new();

        for (index, item) in items.into_iter().enumerate() {
            let key = item.collection_key();
            let slot = match positions.get(key) {
                Some(&slot) => slot,
                None => {
                    positions.insert(key.clone(), pending.len());
                    pending.push_back((key.clone(), Vec::new()));
                    pending.len() - 1
                }
            };
            pending[slot].1.push(Indexed::new(index, item));
        }

        Self { pending }
    }
}

impl<T> CollectionBatch<T> {
    /// Detach the next collection's items; the batch keeps nothing of them.
    pub fn take_next(&mut self) -> Option<(CollectionId, Vec<Indexed<T>>)> {
        self.pending.pop_front()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}
