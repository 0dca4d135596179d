//! # Self-Rescheduling Trigger Scheduler
//!
//! The execution environment offers only "run this entry point again after
//! N minutes", not a blocking sleep, so resumption is modeled as a
//! dead-drop: persist progress, exit, let an external timer call back in.
//! The scheduler guarantees at most one outstanding re-invocation per job
//! name, cross-checking stored handles against the backend's live list so a
//! dangling handle (trigger removed externally) self-heals instead of
//! blocking future arms.

mod tokio_backend;

pub use tokio_backend::{EntryPoint, TokioSchedulerBackend};

use crate::constants::{defaults, keys};
use crate::error::{GapfillError, Result};
use crate::state::StateStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reference to exactly one outstanding scheduled re-invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerHandle {
    pub id: String,
}

impl TriggerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Backend that actually creates, lists, and deletes time-based callbacks
/// against named entry points.
#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    /// Schedule a one-shot invocation of `entry_point` after `delay`
    async fn create_one_shot(&self, entry_point: &str, delay: Duration) -> Result<TriggerHandle>;

    /// Schedule a daily recurring invocation of `entry_point` at the given
    /// UTC wall-clock time
    async fn create_daily(&self, entry_point: &str, hour: u32, minute: u32)
        -> Result<TriggerHandle>;

    /// List currently-live trigger handles so stored handles can be
    /// liveness-checked
    async fn list_live(&self) -> Result<Vec<TriggerHandle>>;

    /// Best-effort delete of a trigger; deleting an unknown handle is not
    /// an error
    async fn delete(&self, handle: &TriggerHandle) -> Result<()>;
}

/// Arm/disarm interface over a [`SchedulerBackend`], with handle bookkeeping
/// in the [`StateStore`].
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn StateStore>,
    backend: Arc<dyn SchedulerBackend>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn StateStore>, backend: Arc<dyn SchedulerBackend>) -> Self {
        Self { store, backend }
    }

    /// Schedule a re-invocation of `job_name` after `delay_minutes`
    /// (clamped to 1..=10). Idempotent: if a stored handle still references
    /// a live trigger this is a no-op; a stale handle is cleared first.
    pub async fn arm(&self, job_name: &str, delay_minutes: u32) -> Result<()> {
        let key = keys::trigger(job_name);

        if let Some(raw) = self.store.get(&key).await? {
            match serde_json::from_str::<TriggerHandle>(&raw) {
                Ok(stored) => {
                    let live = self.backend.list_live().await?;
                    if live.iter().any(|h| h.id == stored.id) {
                        debug!(job_name = %job_name, trigger_id = %stored.id, "Trigger already armed");
                        return Ok(());
                    }
                    warn!(
                        job_name = %job_name,
                        trigger_id = %stored.id,
                        "Stored trigger handle references a dead trigger, clearing"
                    );
                }
                Err(e) => {
                    warn!(job_name = %job_name, error = %e, "Unparseable stored trigger handle, clearing");
                }
            }
            self.store.delete(&key).await?;
        }

        let clamped = delay_minutes.clamp(
            defaults::MIN_TRIGGER_DELAY_MINUTES,
            defaults::MAX_TRIGGER_DELAY_MINUTES,
        );
        let handle = self
            .backend
            .create_one_shot(job_name, Duration::from_secs(u64::from(clamped) * 60))
            .await?;

        self.store
            .set(&key, &serde_json::to_string(&handle)?)
            .await?;

        info!(
            job_name = %job_name,
            trigger_id = %handle.id,
            delay_minutes = clamped,
            "⏰ Trigger armed"
        );
        Ok(())
    }

    /// Delete the live trigger matching the stored handle (if any) and
    /// clear the stored handle regardless, so a failed delete never leaves
    /// a dangling reference that blocks future arms.
    pub async fn disarm(&self, job_name: &str) -> Result<()> {
        let key = keys::trigger(job_name);

        if let Some(raw) = self.store.get(&key).await? {
            if let Ok(stored) = serde_json::from_str::<TriggerHandle>(&raw) {
                if let Err(e) = self.backend.delete(&stored).await {
                    warn!(job_name = %job_name, trigger_id = %stored.id, error = %e, "Trigger delete failed, clearing handle anyway");
                }
            }
        }

        self.store.delete(&key).await?;
        debug!(job_name = %job_name, "Trigger disarmed");
        Ok(())
    }

    /// Whether a live re-invocation is currently scheduled for `job_name`
    pub async fn is_armed(&self, job_name: &str) -> Result<bool> {
        let key = keys::trigger(job_name);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let Ok(stored) = serde_json::from_str::<TriggerHandle>(&raw) else {
            return Ok(false);
        };
        let live = self.backend.list_live().await?;
        Ok(live.iter().any(|h| h.id == stored.id))
    }

    /// Schedule a daily recurring invocation (progress notifications),
    /// replacing any previously stored daily trigger for `name`.
    pub async fn arm_daily(
        &self,
        name: &str,
        entry_point: &str,
        hour: u32,
        minute: u32,
    ) -> Result<()> {
        if hour > 23 || minute > 59 {
            return Err(GapfillError::Scheduler(format!(
                "invalid daily trigger time {hour:02}:{minute:02}"
            )));
        }

        let key = keys::daily_trigger(name);

        if let Some(raw) = self.store.get(&key).await? {
            if let Ok(stored) = serde_json::from_str::<TriggerHandle>(&raw) {
                let _ = self.backend.delete(&stored).await;
            }
            self.store.delete(&key).await?;
        }

        let handle = self.backend.create_daily(entry_point, hour, minute).await?;
        self.store
            .set(&key, &serde_json::to_string(&handle)?)
            .await?;

        info!(
            name = %name,
            entry_point = %entry_point,
            at = %format!("{hour:02}:{minute:02}"),
            trigger_id = %handle.id,
            "⏰ Daily trigger armed"
        );
        Ok(())
    }

    /// Remove the daily recurring trigger stored under `name`
    pub async fn disarm_daily(&self, name: &str) -> Result<()> {
        let key = keys::daily_trigger(name);
        if let Some(raw) = self.store.get(&key).await? {
            if let Ok(stored) = serde_json::from_str::<TriggerHandle>(&raw) {
                let _ = self.backend.delete(&stored).await;
            }
        }
        self.store.delete(&key).await
    }
}
