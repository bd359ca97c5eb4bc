//! Request states, edit modes and outcome types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::changes::ChangeSet;
use super::item::CalendarItem;
use crate::constants::{EDIT_MODE_FLAG_ALL, EDIT_MODE_FLAG_THIS, EDIT_MODE_FLAG_THIS_AND_FUTURE};
use crate::impl_domain_status_conversions;

/// Outcome kind of one item or of a whole request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    NoError,
    Unspecified,
    Cancelled,
    InvalidItem,
    NotFound,
    Locked,
    PermissionDenied,
}

impl_domain_status_conversions!(ErrorKind {
    NoError => "no_error",
    Unspecified => "unspecified",
    Cancelled => "cancelled",
    InvalidItem => "invalid_item",
    NotFound => "not_found",
    Locked => "locked",
    PermissionDenied => "permission_denied",
});

impl ErrorKind {
    pub fn is_error(self) -> bool {
        self != Self::NoError
    }
}

/// Lifecycle state of a request as seen by its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Inactive,
    Active,
    Cancelled,
    Finished,
}

impl_domain_status_conversions!(RequestState {
    Inactive => "inactive",
    Active => "active",
    Cancelled => "cancelled",
    Finished => "finished",
});

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished)
    }
}

/// Operation a request performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Save,
    Remove,
    Query,
}

impl_domain_status_conversions!(RequestKind {
    Save => "save",
    Remove => "remove",
    Query => "query",
});

/// How an update to a recurring item is reconciled with its series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Create or update the exception for one occurrence.
    #[default]
    ThisOccurrence,
    /// Truncate the series before the occurrence and start a new one there.
    ThisAndFollowing,
    /// Update the master record.
    AllOccurrences,
}

impl_domain_status_conversions!(EditMode {
    ThisOccurrence => "this_occurrence",
    ThisAndFollowing => "this_and_following",
    AllOccurrences => "all_occurrences",
});

impl EditMode {
    /// Decode the store's numeric update-mode property.
    ///
    /// The widest recognised bit wins; `None` when no supported bit is set.
    pub fn from_flags(flags: u32) -> Option<Self> {
        if flags & EDIT_MODE_FLAG_ALL != 0 {
            Some(Self::AllOccurrences)
        } else if flags & EDIT_MODE_FLAG_THIS_AND_FUTURE != 0 {
            Some(Self::ThisAndFollowing)
        } else if flags & EDIT_MODE_FLAG_THIS != 0 {
            Some(Self::ThisOccurrence)
        } else {
            None
        }
    }
}

/// Consolidated result of one request, published exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// Overall error; `NoError` unless nothing could be attempted or the
    /// request was cancelled.
    pub error: ErrorKind,
    /// Persisted items (save) or fetched items (query), completion order.
    pub items: Vec<CalendarItem>,
    /// Failures keyed by the item's index in the request input.
    pub error_map: BTreeMap<usize, ErrorKind>,
    /// Identities added, changed or removed by this request.
    pub change_set: ChangeSet,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        !self.error.is_error() && self.error_map.is_empty()
    }
}
