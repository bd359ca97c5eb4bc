//! Occurrence-aware query engine.
//!
//! Reads stored series from the [`CalendarStore`] and expands recurring
//! masters through the [`RecurrenceExpander`]:
//! - stored exceptions replace the occurrence they override and are matched
//!   against the window by their own start and end
//! - excluded starts are skipped
//! - an unbounded range returns stored records only, without expansion

use std::collections::BTreeMap;

use calbridge_domain::{
    CalendarItem, ErrorKind, ItemFilter, ItemId, ItemKind, ItemQuery, OccurrenceParent,
    QueryConfig, StoreError, StoredSeries, TimeWindow,
};
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::calendar_ports::{CalendarStore, RecurrenceExpander, StoreResult};

/// Items returned by one query, plus per-index failures for id lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<CalendarItem>,
    pub errors: BTreeMap<usize, ErrorKind>,
}

pub struct QueryEngine<'a> {
    store: &'a dyn CalendarStore,
    expander: &'a dyn RecurrenceExpander,
    config: &'a QueryConfig,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        store: &'a dyn CalendarStore,
        expander: &'a dyn RecurrenceExpander,
        config: &'a QueryConfig,
    ) -> Self {
        Self { store, expander, config }
    }

    pub async fn run(&self, query: &ItemQuery, cancel: &CancellationToken) -> StoreResult<QueryOutput> {
        match query {
            ItemQuery::Range { filter, window, limit } => {
                let items = self.range(filter, window, *limit, cancel).await?;
                Ok(QueryOutput { items, errors: BTreeMap::new() })
            }
            ItemQuery::Occurrences { master, window, limit } => {
                let series = self.store.fetch_one(&master.master(), cancel).await?;
                let mut items = self.expand_series(&series, window);
                self.sort_and_limit(&mut items, *limit);
                Ok(QueryOutput { items, errors: BTreeMap::new() })
            }
            ItemQuery::ByIds { ids } => self.by_ids(ids, cancel).await,
        }
    }

    async fn range(
        &self,
        filter: &ItemFilter,
        window: &TimeWindow,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<CalendarItem>> {
        let stored = self.store.fetch_series(filter, cancel).await?;

        let mut items: Vec<CalendarItem> = if window.is_unbounded() {
            stored.into_iter().map(|series| series.master).collect()
        } else {
            stored
                .iter()
                .flat_map(|series| {
                    if series.master.is_recurring() {
                        self.expand_series(series, window)
                    } else if series.master.overlaps(window.start, window.end) {
                        vec![series.master.clone()]
                    } else {
                        Vec::new()
                    }
                })
                .collect()
        };

        self.sort_and_limit(&mut items, limit);
        debug!(count = items.len(), unbounded = window.is_unbounded(), "range query resolved");
        Ok(items)
    }

    async fn by_ids(&self, ids: &[ItemId], cancel: &CancellationToken) -> StoreResult<QueryOutput> {
        let mut output = QueryOutput::default();
        for (index, id) in ids.iter().enumerate() {
            match self.lookup(id, cancel).await {
                Ok(item) => output.items.push(item),
                Err(StoreError::Cancelled) => return Err(StoreError::Cancelled),
                Err(err) => {
                    debug!(index, %id, error = %err, "lookup failed");
                    output.errors.insert(index, err.kind());
                }
            }
        }
        Ok(output)
    }

    async fn lookup(&self, id: &ItemId, cancel: &CancellationToken) -> StoreResult<CalendarItem> {
        let series = self.store.fetch_one(&id.master(), cancel).await?;
        let Some(original_start) = id.recurrence_id() else {
            return Ok(series.master);
        };

        if let Some(exception) = series.exception_for(original_start) {
            return Ok(exception.clone());
        }
        if series.excluded.contains(&original_start) || !self.is_occurrence_of(&series, original_start) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        generated_occurrence(&series.master, original_start)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn is_occurrence_of(&self, series: &StoredSeries, at: DateTime<Utc>) -> bool {
        let (Some(rule), Some(start)) = (&series.master.recurrence, series.master.start) else {
            return false;
        };
        let instant = TimeWindow::new(at, at + Duration::seconds(1));
        self.expander.expand(rule, start, series.master.zone(), &instant, 1).contains(&at)
    }

    /// Occurrences of one series inside `window`.
    pub fn expand_series(&self, series: &StoredSeries, window: &TimeWindow) -> Vec<CalendarItem> {
        let master = &series.master;
        let (Some(rule), Some(start)) = (&master.recurrence, master.start) else {
            return if master.overlaps(window.start, window.end) {
                vec![master.clone()]
            } else {
                Vec::new()
            };
        };

        // Exceptions are placed by their own times, wherever their original
        // occurrence falls.
        let exceptions = series
            .exceptions
            .iter()
            .filter(|e| e.parent.as_ref().is_some_and(|p| !series.excluded.contains(&p.original_start)))
            .filter(|e| e.overlaps(window.start, window.end))
            .cloned();

        self.expander
            .expand(rule, start, master.zone(), window, self.config.max_expansion)
            .into_iter()
            .filter(|at| !series.excluded.contains(at) && series.exception_for(*at).is_none())
            .filter_map(|at| generated_occurrence(master, at))
            .chain(exceptions)
            .collect()
    }

    fn sort_and_limit(&self, items: &mut Vec<CalendarItem>, limit: Option<usize>) {
        items.sort_by(|a, b| (a.start, a.id.as_ref()).cmp(&(b.start, b.id.as_ref())));
        items.truncate(limit.unwrap_or(self.config.default_limit));
    }
}

/// Occurrence of `master` starting at `start`, as produced by expansion.
pub fn generated_occurrence(master: &CalendarItem, start: DateTime<Utc>) -> Option<CalendarItem> {
    let master_id = master.id.clone()?;
    let duration = master.duration().unwrap_or_else(Duration::zero);
    Some(CalendarItem {
        id: Some(master_id.occurrence(start)),
        collection_id: master.collection_id.clone(),
        kind: ItemKind::EventOccurrence,
        display_label: master.display_label.clone(),
        description: master.description.clone(),
        start: Some(start),
        end: Some(start + duration),
        time_zone: master.time_zone,
        recurrence: None,
        parent: Some(OccurrenceParent { master_id, original_start: start }),
    })
}
