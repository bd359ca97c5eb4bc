use std::sync::{Arc, Mutex};

use calbridge_core::ChangeSink;
use calbridge_domain::{ChangeSet, ItemId};

/// Change sink that keeps every published change set.
#[derive(Default, Clone)]
pub struct RecordingSink {
    published: Arc<Mutex<Vec<ChangeSet>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<ChangeSet> {
        self.published.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Every id reported as added, across all notifications.
    pub fn all_added(&self) -> Vec<ItemId> {
        self.published.lock().unwrap().iter().flat_map(|c| c.added.iter().cloned()).collect()
    }
}

impl ChangeSink for RecordingSink {
    fn publish(&self, changes: &ChangeSet) {
        self.published.lock().unwrap().push(changes.clone());
    }
}
