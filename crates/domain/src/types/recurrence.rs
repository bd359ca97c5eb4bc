//! Recurrence rules attached to master records

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::{CalbridgeError, Result};

/// How often a series repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Where a series stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceLimit {
    /// Last local date (inclusive) on which an occurrence may start.
    Until(NaiveDate),
    /// Total number of occurrences, counted from the series start.
    Count(u32),
}

/// Recurrence rule of a master record.
///
/// Empty `days_of_week` / `days_of_month` mean "the weekday / day of month of
/// the series start".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    #[serde(default)]
    pub days_of_month: Vec<u32>,
    #[serde(default)]
    pub limit: Option<RecurrenceLimit>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: Vec::new(),
            days_of_month: Vec::new(),
            limit: None,
        }
    }

    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    pub fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    pub fn yearly() -> Self {
        Self::new(Frequency::Yearly)
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Restrict a weekly rule to the given weekdays (kept sorted Monday first).
    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(Weekday::num_days_from_monday);
        days.dedup();
        self.days_of_week = days;
        self
    }

    /// Restrict a monthly rule to the given days of the month.
    pub fn on_month_days(mut self, days: impl IntoIterator<Item = u32>) -> Self {
        let mut days: Vec<u32> = days.into_iter().collect();
        days.sort_unstable();
        days.dedup();
        self.days_of_month = days;
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.limit = Some(RecurrenceLimit::Until(date));
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.limit = Some(RecurrenceLimit::Count(count));
        self
    }

    pub fn limit_date(&self) -> Option<NaiveDate> {
        match self.limit {
            Some(RecurrenceLimit::Until(date)) => Some(date),
            _ => None,
        }
    }

    pub fn limit_count(&self) -> Option<u32> {
        match self.limit {
            Some(RecurrenceLimit::Count(count)) => Some(count),
            _ => None,
        }
    }

    /// True when the rule never ends on its own.
    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(CalbridgeError::InvalidInput("recurrence interval must be >= 1".into()));
        }
        if self.days_of_month.iter().any(|d| !(1..=31).contains(d)) {
            return Err(CalbridgeError::InvalidInput("day of month out of range".into()));
        }
        if self.limit_count() == Some(0) {
            return Err(CalbridgeError::InvalidInput("recurrence count must be >= 1".into()));
        }
        Ok(())
    }
}
