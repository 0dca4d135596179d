//! Calendar-day-scoped activity stats.
//!
//! One record per job family, keyed by the day it was created. When a new
//! calendar day begins the stored record is superseded by a fresh zeroed
//! one - never merged across days.

use crate::constants::keys;
use crate::error::Result;
use crate::state::store::StateStore;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single day's activity for a job family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub searches_performed: u64,
    /// Saved file counts keyed by kind (`csv`, `zip`, `other`)
    #[serde(default)]
    pub saved_by_kind: BTreeMap<String, u64>,
    /// Work unit keys completed today
    #[serde(default)]
    pub dates_completed: Vec<String>,
    /// Day the last daily progress notification went out; deduplicates
    /// the notification to at most one per day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified: Option<NaiveDate>,
}

impl DailyStats {
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            searches_performed: 0,
            saved_by_kind: BTreeMap::new(),
            dates_completed: Vec::new(),
            last_notified: None,
        }
    }

    pub fn record_saved(&mut self, kind: impl Into<String>, count: u64) {
        *self.saved_by_kind.entry(kind.into()).or_default() += count;
    }

    pub fn total_saved(&self) -> u64 {
        self.saved_by_kind.values().sum()
    }
}

/// Store-backed tracker for a job family's daily stats.
#[derive(Clone)]
pub struct DailyStatsTracker {
    store: Arc<dyn StateStore>,
    family: String,
}

impl DailyStatsTracker {
    pub fn new(store: Arc<dyn StateStore>, family: impl Into<String>) -> Self {
        Self {
            store,
            family: family.into(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Load today's stats, replacing the stored record with a fresh zeroed
    /// one when the stored date is not the current day.
    pub async fn today(&self) -> Result<DailyStats> {
        self.stats_for(Utc::now().date_naive()).await
    }

    /// Day-explicit variant of [`today`](Self::today), used directly by tests.
    pub async fn stats_for(&self, day: NaiveDate) -> Result<DailyStats> {
        let key = keys::daily_stats(&self.family);
        if let Some(raw) = self.store.get(&key).await? {
            if let Ok(stats) = serde_json::from_str::<DailyStats>(&raw) {
                if stats.date == day {
                    return Ok(stats);
                }
            }
        }
        Ok(DailyStats::fresh(day))
    }

    pub async fn save(&self, stats: &DailyStats) -> Result<()> {
        let raw = serde_json::to_string(stats)?;
        self.store.set(&keys::daily_stats(&self.family), &raw).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&keys::daily_stats(&self.family)).await
    }
}
