//! Calendar items and their identities

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::recurrence::RecurrenceRule;
use super::request::ErrorKind;
use crate::constants::{ITEM_ID_SEPARATOR, RECURRENCE_ID_FORMAT, RECURRENCE_ID_SEPARATOR};
use crate::errors::{CalbridgeError, Result};

/// Identifier of a collection (a calendar) owning a set of items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CollectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable identity of a stored item.
///
/// A master or plain record is `collection/uid`. A single occurrence of a
/// recurring series additionally carries the occurrence's original start as
/// its recurrence id: `collection/uid#20131216T030000Z`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    collection: CollectionId,
    uid: String,
    recurrence_id: Option<DateTime<Utc>>,
}

impl ItemId {
    pub fn new(collection: impl Into<CollectionId>, uid: impl Into<String>) -> Self {
        Self { collection: collection.into(), uid: uid.into(), recurrence_id: None }
    }

    /// Identity of the occurrence of this series starting at `original_start`.
    pub fn occurrence(&self, original_start: DateTime<Utc>) -> Self {
        Self {
            collection: self.collection.clone(),
            uid: self.uid.clone(),
            recurrence_id: Some(original_start),
        }
    }

    /// Identity of the master record this id belongs to.
    pub fn master(&self) -> Self {
        Self { collection: self.collection.clone(), uid: self.uid.clone(), recurrence_id: None }
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.collection
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn recurrence_id(&self) -> Option<DateTime<Utc>> {
        self.recurrence_id
    }

    pub fn is_occurrence(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(value: &str) -> Result<Self> {
        let (collection, rest) = value.split_once(ITEM_ID_SEPARATOR).ok_or_else(|| {
            CalbridgeError::InvalidInput(format!("item id without collection: {value}"))
        })?;
        if collection.is_empty() {
            return Err(CalbridgeError::InvalidInput(format!("empty collection in {value}")));
        }

        let (uid, recurrence_id) = match rest.split_once(RECURRENCE_ID_SEPARATOR) {
            Some((uid, rid)) => {
                let parsed = NaiveDateTime::parse_from_str(rid, RECURRENCE_ID_FORMAT)
                    .map_err(|e| {
                        CalbridgeError::InvalidInput(format!("invalid recurrence id {rid}: {e}"))
                    })?;
                (uid, Some(parsed.and_utc()))
            }
            None => (rest, None),
        };
        if uid.is_empty() {
            return Err(CalbridgeError::InvalidInput(format!("empty uid in {value}")));
        }

        Ok(Self { collection: CollectionId::new(collection), uid: uid.to_string(), recurrence_id })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.collection, ITEM_ID_SEPARATOR, self.uid)?;
        if let Some(rid) = self.recurrence_id {
            write!(f, "{}{}", RECURRENCE_ID_SEPARATOR, rid.format(RECURRENCE_ID_FORMAT))?;
        }
        Ok(())
    }
}

/// Kind of calendar item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Event,
    EventOccurrence,
    Todo,
}

/// Link from an occurrence back to the series it was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceParent {
    pub master_id: ItemId,
    pub original_start: DateTime<Utc>,
}

/// Calendar item as exchanged with callers.
///
/// An item without `id` has never been persisted; saving it creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarItem {
    pub id: Option<ItemId>,
    pub collection_id: CollectionId,
    pub kind: ItemKind,
    pub display_label: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub time_zone: Option<Tz>,
    pub recurrence: Option<RecurrenceRule>,
    pub parent: Option<OccurrenceParent>,
}

impl CalendarItem {
    /// New, not yet persisted event in `collection`.
    pub fn event(collection: impl Into<CollectionId>, display_label: impl Into<String>) -> Self {
        Self {
            id: None,
            collection_id: collection.into(),
            kind: ItemKind::Event,
            display_label: display_label.into(),
            description: None,
            start: None,
            end: None,
            time_zone: None,
            recurrence: None,
            parent: None,
        }
    }

    /// New, not yet persisted todo in `collection`.
    pub fn todo(collection: impl Into<CollectionId>, display_label: impl Into<String>) -> Self {
        Self { kind: ItemKind::Todo, ..Self::event(collection, display_label) }
    }

    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_time_zone(mut self, zone: Tz) -> Self {
        self.time_zone = Some(zone);
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn has_identity(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Zone used for recurrence expansion; UTC when none is set.
    pub fn zone(&self) -> Tz {
        self.time_zone.unwrap_or(Tz::UTC)
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// True when the item's time span intersects `[start, end)`.
    pub fn overlaps(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        let Some(item_start) = self.start else {
            return start.is_none() && end.is_none();
        };
        let item_end = self.end.unwrap_or(item_start);
        let after_start = start.map_or(true, |s| item_end > s || item_start >= s);
        let before_end = end.map_or(true, |e| item_start < e);
        after_start && before_end
    }

    /// Structural validation applied before any store call.
    pub fn validate(&self) -> std::result::Result<(), ErrorKind> {
        if let Some(id) = &self.id {
            if id.collection_id() != &self.collection_id {
                return Err(ErrorKind::InvalidItem);
            }
        }
        if self.kind != ItemKind::Todo && self.start.is_none() {
            return Err(ErrorKind::InvalidItem);
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(ErrorKind::InvalidItem);
            }
        }
        if let Some(rule) = &self.recurrence {
            if self.kind == ItemKind::EventOccurrence || self.start.is_none() {
                return Err(ErrorKind::InvalidItem);
            }
            rule.validate().map_err(|_| ErrorKind::InvalidItem)?;
        }
        Ok(())
    }
}
