//! Checkpoint model: the durable snapshot of a job's progress.
//!
//! The engine owns the queue, cursor, and accumulators; each job carries its
//! own serde-serializable payload (e.g. the observation index for the audit
//! job). The checkpoint is read at the start of every invocation and written
//! after every unit of progress, so at most one unit of work is ever lost.

use crate::constants::keys;
use crate::error::{GapfillError, Result};
use crate::state::store::StateStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-unit status within a job's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitStatus {
    /// Not attempted yet
    Pending,
    /// Processed successfully; never reprocessed absent an explicit reset
    Completed,
    /// Failed with a unit-local error and skipped
    Error,
    /// Attempt hit upstream capacity exhaustion; retried on resume
    Paused,
}

impl WorkUnitStatus {
    /// Check if the unit will not be attempted again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for WorkUnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for WorkUnitStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("Invalid work unit status: {s}")),
        }
    }
}

/// Overall job status carried in the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Paused,
    Completed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// The smallest independently resumable increment of a job: one calendar
/// day, or a coarser grouping (a month folder) when finer granularity is
/// unnecessary. The key carries enough identity to reprocess idempotently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Date string or grouping key (e.g. `2025-05-01` or `May`)
    pub key: String,
    pub status: WorkUnitStatus,
    /// Diagnostic message recorded when status is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// What this unit produced (files saved by kind, dates scanned, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: BTreeMap<String, u64>,
}

impl WorkUnit {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: WorkUnitStatus::Pending,
            error: None,
            counters: BTreeMap::new(),
        }
    }
}

/// Durable snapshot of a job's progress, parametrized by the job-specific
/// payload. Must round-trip losslessly through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    pub queue: Vec<WorkUnit>,
    /// Index of the next unit to attempt; monotonically non-decreasing
    /// within a job's lifetime until completion or explicit reset.
    pub cursor_index: usize,
    pub units_processed: u64,
    pub accumulators: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    /// Job-specific state (observation index, folder maps, ...)
    pub payload: S,
}

impl<S> Checkpoint<S> {
    pub fn new(queue: Vec<WorkUnit>, payload: S) -> Self {
        Self {
            queue,
            cursor_index: 0,
            units_processed: 0,
            accumulators: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            status: JobStatus::Running,
            payload,
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor_index >= self.queue.len()
    }

    /// Count of units that failed and were skipped
    pub fn units_failed(&self) -> u64 {
        self.queue
            .iter()
            .filter(|u| u.status == WorkUnitStatus::Error)
            .count() as u64
    }

    /// Condensed view for progress notifications
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_units: self.queue.len(),
            completed: self.units_processed,
            failed: self.units_failed(),
            started_at: self.started_at,
            status: self.status,
            first_key: self.queue.first().map(|u| u.key.clone()),
            last_key: self.queue.last().map(|u| u.key.clone()),
        }
    }
}

/// Read-only progress view handed to notification builders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_units: usize,
    pub completed: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub status: JobStatus,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
}

impl ProgressSnapshot {
    pub fn remaining(&self) -> u64 {
        (self.total_units as u64).saturating_sub(self.completed)
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total_units as f64) * 100.0
    }
}

/// Load a job's checkpoint from the store.
///
/// A present-but-undeserializable value is state corruption: fatal for the
/// run, surfaced for manual reset rather than silently rebuilt.
pub async fn load_checkpoint<S: DeserializeOwned>(
    store: &dyn StateStore,
    job_name: &str,
) -> Result<Option<Checkpoint<S>>> {
    match store.get(&keys::checkpoint(job_name)).await? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            GapfillError::StateCorruption {
                job_name: job_name.to_string(),
                reason: e.to_string(),
            }
        }),
        None => Ok(None),
    }
}

/// Persist the full checkpoint. Called after every unit of progress.
pub async fn save_checkpoint<S: Serialize>(
    store: &dyn StateStore,
    job_name: &str,
    checkpoint: &Checkpoint<S>,
) -> Result<()> {
    let raw = serde_json::to_string(checkpoint)?;
    store.set(&keys::checkpoint(job_name), &raw).await
}

/// Delete a job's checkpoint.
pub async fn clear_checkpoint(store: &dyn StateStore, job_name: &str) -> Result<()> {
    store.delete(&keys::checkpoint(job_name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::MemoryStateStore;

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(WorkUnitStatus::Paused.to_string(), "paused");
        assert_eq!(
            "completed".parse::<WorkUnitStatus>().unwrap(),
            WorkUnitStatus::Completed
        );
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("unknown".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_unit_status_terminality() {
        assert!(WorkUnitStatus::Completed.is_terminal());
        assert!(WorkUnitStatus::Error.is_terminal());
        assert!(!WorkUnitStatus::Pending.is_terminal());
        assert!(!WorkUnitStatus::Paused.is_terminal());
    }

    #[test]
    fn test_checkpoint_serde_round_trip() {
        let mut checkpoint = Checkpoint::new(
            vec![WorkUnit::new("2025-05-01"), WorkUnit::new("2025-05-02")],
            BTreeMap::from([("seen".to_string(), 4u64)]),
        );
        checkpoint.cursor_index = 1;
        checkpoint.units_processed = 1;
        checkpoint.queue[0].status = WorkUnitStatus::Completed;
        checkpoint
            .queue[0]
            .counters
            .insert("files_saved".to_string(), 12);
        checkpoint
            .accumulators
            .insert("files_saved".to_string(), 12);

        let json = serde_json::to_string(&checkpoint).unwrap();
        let parsed: Checkpoint<BTreeMap<String, u64>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[test]
    fn test_progress_snapshot() {
        let mut checkpoint = Checkpoint::new(
            vec![
                WorkUnit::new("a"),
                WorkUnit::new("b"),
                WorkUnit::new("c"),
                WorkUnit::new("d"),
            ],
            (),
        );
        checkpoint.units_processed = 1;
        checkpoint.cursor_index = 2;
        checkpoint.queue[0].status = WorkUnitStatus::Completed;
        checkpoint.queue[1].status = WorkUnitStatus::Error;

        let progress = checkpoint.progress();
        assert_eq!(progress.total_units, 4);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.remaining(), 3);
        assert!((progress.percent_complete() - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_load_absent_checkpoint() {
        let store = MemoryStateStore::new();
        let loaded = load_checkpoint::<()>(&store, "job").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_load_clear_cycle() {
        let store = MemoryStateStore::new();
        let checkpoint = Checkpoint::new(vec![WorkUnit::new("May")], ());

        save_checkpoint(&store, "audit", &checkpoint).await.unwrap();
        let loaded = load_checkpoint::<()>(&store, "audit").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);

        clear_checkpoint(&store, "audit").await.unwrap();
        assert!(load_checkpoint::<()>(&store, "audit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_surfaces_state_corruption() {
        let store = MemoryStateStore::new();
        store
            .set(&keys::checkpoint("audit"), "{not valid json")
            .await
            .unwrap();

        let err = load_checkpoint::<()>(&store, "audit").await.unwrap_err();
        assert!(matches!(err, GapfillError::StateCorruption { .. }));
    }
}
