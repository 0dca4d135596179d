//! In-process tokio backend for the scheduler.
//!
//! Entry points register under a name; one-shot triggers become spawned
//! sleep-then-invoke tasks, daily triggers become long-lived loops. The
//! live-trigger table backs the liveness cross-check `arm` relies on;
//! deleting a trigger removes it from the table, which the spawned task
//! observes before invoking.

use super::{SchedulerBackend, TriggerHandle};
use crate::error::{GapfillError, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A job entry point the backend can invoke on a timer.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    async fn invoke(&self);
}

#[derive(Clone)]
pub struct TokioSchedulerBackend {
    entry_points: Arc<DashMap<String, Arc<dyn EntryPoint>>>,
    live: Arc<DashMap<String, String>>, // trigger id -> entry point name
}

impl TokioSchedulerBackend {
    pub fn new() -> Self {
        Self {
            entry_points: Arc::new(DashMap::new()),
            live: Arc::new(DashMap::new()),
        }
    }

    /// Register the entry point a trigger name resolves to
    pub fn register(&self, name: impl Into<String>, entry_point: Arc<dyn EntryPoint>) {
        self.entry_points.insert(name.into(), entry_point);
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn EntryPoint>> {
        self.entry_points.get(name).map(|e| e.value().clone())
    }

    fn next_daily_delay(hour: u32, minute: u32) -> Duration {
        let target = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        let now = Utc::now();
        let today_target = now.date_naive().and_time(target).and_utc();
        let next = if today_target > now {
            today_target
        } else {
            today_target + chrono::Duration::days(1)
        };
        (next - now).to_std().unwrap_or(Duration::from_secs(0))
    }
}

impl Default for TokioSchedulerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerBackend for TokioSchedulerBackend {
    async fn create_one_shot(&self, entry_point: &str, delay: Duration) -> Result<TriggerHandle> {
        let id = Uuid::new_v4().to_string();
        self.live.insert(id.clone(), entry_point.to_string());

        let live = Arc::clone(&self.live);
        let entry_points = Arc::clone(&self.entry_points);
        let entry_name = entry_point.to_string();
        let trigger_id = id.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deleted triggers never fire
            if live.remove(&trigger_id).is_none() {
                return;
            }
            match entry_points.get(&entry_name).map(|e| e.value().clone()) {
                Some(entry) => {
                    debug!(entry_point = %entry_name, trigger_id = %trigger_id, "One-shot trigger firing");
                    entry.invoke().await;
                }
                None => {
                    warn!(entry_point = %entry_name, "Trigger fired for unregistered entry point");
                }
            }
        });

        Ok(TriggerHandle::new(id))
    }

    async fn create_daily(
        &self,
        entry_point: &str,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerHandle> {
        if self.resolve(entry_point).is_none() {
            return Err(GapfillError::Scheduler(format!(
                "entry point {entry_point} not registered"
            )));
        }

        let id = Uuid::new_v4().to_string();
        self.live.insert(id.clone(), entry_point.to_string());

        let live = Arc::clone(&self.live);
        let entry_points = Arc::clone(&self.entry_points);
        let entry_name = entry_point.to_string();
        let trigger_id = id.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Self::next_daily_delay(hour, minute)).await;
                if !live.contains_key(&trigger_id) {
                    return;
                }
                match entry_points.get(&entry_name).map(|e| e.value().clone()) {
                    Some(entry) => {
                        debug!(entry_point = %entry_name, trigger_id = %trigger_id, "Daily trigger firing");
                        entry.invoke().await;
                    }
                    None => return,
                }
            }
        });

        Ok(TriggerHandle::new(id))
    }

    async fn list_live(&self) -> Result<Vec<TriggerHandle>> {
        Ok(self
            .live
            .iter()
            .map(|entry| TriggerHandle::new(entry.key().clone()))
            .collect())
    }

    async fn delete(&self, handle: &TriggerHandle) -> Result<()> {
        self.live.remove(&handle.id);
        Ok(())
    }
}
