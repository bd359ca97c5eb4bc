//! Create/update classification of one collection's save items.

use calbridge_domain::{CalendarItem, EditMode};

use super::batcher::Indexed;
use crate::calendar_ports::{CalendarStore, ItemUpdate, SessionRef, StoreResult};

/// One collection's items split into the two store calls they need.
#[derive(Debug, Default, PartialEq)]
pub struct SplitItems {
    pub to_create: Vec<Indexed<CalendarItem>>,
    pub to_update: Vec<Indexed<CalendarItem>>,
}

/// Working set of the collection currently being saved.
///
/// A fresh splitter is built per collection, so nothing from a previous
/// collection can leak into the next one.
#[derive(Debug)]
pub struct OccurrenceSplitter {
    working: Vec<Indexed<CalendarItem>>,
    mode: EditMode,
}

impl OccurrenceSplitter {
    /// `hint` is the save's edit-mode property; `default` applies without one.
    pub fn new(items: Vec<Indexed<CalendarItem>>, hint: Option<EditMode>, default: EditMode) -> Self {
        Self { working: items, mode: hint.unwrap_or(default) }
    }

    /// Edit mode requested for this save.
    pub fn edit_mode(&self) -> EditMode {
        self.mode
    }

    /// Edit mode applied to one update.
    ///
    /// Only an occurrence identity can be reconciled with its series; an
    /// update addressed to a master or plain record always rewrites that
    /// record.
    pub fn mode_for(&self, item: &CalendarItem) -> EditMode {
        match &item.id {
            Some(id) if id.is_occurrence() => self.mode,
            _ => EditMode::ThisOccurrence,
        }
    }

    /// Items without an identity; removes them from the working set.
    pub fn take_items_to_create(&mut self) -> Vec<Indexed<CalendarItem>> {
        self.take_where(|item| !item.has_identity())
    }

    /// Items with an identity; removes them from the working set.
    pub fn take_items_to_update(&mut self) -> Vec<Indexed<CalendarItem>> {
        self.take_where(CalendarItem::has_identity)
    }

    /// Drain the whole working set.
    pub fn split(&mut self) -> SplitItems {
        SplitItems { to_create: self.take_items_to_create(), to_update: self.take_items_to_update() }
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    fn take_where(&mut self, keep: impl Fn(&CalendarItem) -> bool) -> Vec<Indexed<CalendarItem>> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.working)
            .into_iter()
            .partition(|entry| keep(&entry.value));
        self.working = rest;
        taken
    }
}

/// Build the store update for `item`, resolving the master record when the
/// edit mode writes to the series rather than to one occurrence.
pub(crate) async fn prepare_update(
    store: &dyn CalendarStore,
    session: &SessionRef,
    item: CalendarItem,
    mode: EditMode,
) -> StoreResult<ItemUpdate> {
    let master = match (mode, &item.id) {
        (EditMode::ThisOccurrence, _) | (_, None) => None,
        (_, Some(id)) => Some(store.resolve_master(session, id).await?),
    };
    Ok(ItemUpdate { item, mode, master })
}
