//! Domain types and models
//!
//! Items and identities, recurrence rules, request/outcome types, change
//! sets and query shapes.

pub mod changes;
pub mod item;
pub mod query;
pub mod recurrence;
pub mod request;

pub use changes::{ChangeSet, StoredSeries};
pub use item::{CalendarItem, CollectionId, ItemId, ItemKind, OccurrenceParent};
pub use query::{ItemFilter, ItemQuery, TimeWindow};
pub use recurrence::{Frequency, RecurrenceLimit, RecurrenceRule};
pub use request::{EditMode, ErrorKind, RequestKind, RequestOutcome, RequestState};
