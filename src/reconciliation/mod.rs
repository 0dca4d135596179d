//! # Reconciliation Engine
//!
//! Pure per-date status computation: given an expected calendar range, the
//! observations accumulated by a scan job, and the expected dimension set,
//! classify each date as complete, partial (with the missing dimensions),
//! or missing. No I/O and no side effects - this is what keeps the logic
//! unit-testable without any external system.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Inclusive, contiguous calendar-day range, optionally filtered to days of
/// the month at or above a floor (models reporting windows like "15th
/// onwards only").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_day_of_month: Option<u32>,
}

impl ExpectedDateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            min_day_of_month: None,
        }
    }

    /// Restrict the range to days of the month `>= day`
    pub fn with_min_day_of_month(mut self, day: u32) -> Self {
        self.min_day_of_month = Some(day);
        self
    }

    /// Materialize the expected dates in chronological order
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            let included = match self.min_day_of_month {
                Some(min_day) => chrono::Datelike::day(&current) >= min_day,
                None => true,
            };
            if included {
                dates.push(current);
            }
            match current.checked_add_days(Days::new(1)) {
                Some(next) => current = next,
                None => break,
            }
        }
        dates
    }
}

/// What one scanned date yielded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Files seen for this date (only files that resolved to a dimension)
    pub count: u64,
    pub dimensions_seen: BTreeSet<String>,
}

/// Mapping from date to scan observations, built incrementally by the
/// chunked processor. Never shrinks once a unit's scan is committed to the
/// checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationIndex {
    entries: BTreeMap<NaiveDate, Observation>,
}

impl ObservationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed file for `date`, attributed to `dimension`
    pub fn record(&mut self, date: NaiveDate, dimension: impl Into<String>) {
        let entry = self.entries.entry(date).or_default();
        entry.count += 1;
        entry.dimensions_seen.insert(dimension.into());
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&Observation> {
        self.entries.get(date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Observation)> {
        self.entries.iter()
    }
}

/// Per-date reconciliation verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStatusKind {
    /// Every expected dimension was observed
    Complete,
    /// Some but not all expected dimensions were observed
    Partial,
    /// No observation, or an observation with zero count
    Missing,
}

/// Reconciliation result for one expected date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateStatus {
    pub date: NaiveDate,
    pub kind: DateStatusKind,
    pub files_seen: u64,
    pub dimensions_found: usize,
    /// Missing dimensions in the expected set's declared order
    pub missing_dimensions: Vec<String>,
}

/// Diff the accumulated observations against the expected date range and
/// dimension universe.
///
/// Output order matches the range's chronological order; this determines
/// report row order. An empty expected set degenerates to found/missing
/// semantics: any non-zero observation is `Complete`.
pub fn reconcile(
    expected_range: &ExpectedDateRange,
    observations: &ObservationIndex,
    expected_dimensions: &[String],
) -> Vec<DateStatus> {
    expected_range
        .dates()
        .into_iter()
        .map(|date| match observations.get(&date) {
            None => DateStatus {
                date,
                kind: DateStatusKind::Missing,
                files_seen: 0,
                dimensions_found: 0,
                missing_dimensions: expected_dimensions.to_vec(),
            },
            Some(observation) if observation.count == 0 => DateStatus {
                date,
                kind: DateStatusKind::Missing,
                files_seen: 0,
                dimensions_found: 0,
                missing_dimensions: expected_dimensions.to_vec(),
            },
            Some(observation) => {
                let missing: Vec<String> = expected_dimensions
                    .iter()
                    .filter(|dim| !observation.dimensions_seen.contains(*dim))
                    .cloned()
                    .collect();
                let kind = if missing.is_empty() {
                    DateStatusKind::Complete
                } else {
                    DateStatusKind::Partial
                };
                DateStatus {
                    date,
                    kind,
                    files_seen: observation.count,
                    dimensions_found: observation.dimensions_seen.len(),
                    missing_dimensions: missing,
                }
            }
        })
        .collect()
}
