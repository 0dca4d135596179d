//! # Chunked Processor
//!
//! The resumable, time-budgeted execution loop at the center of the crate.
//! A job is decomposed into an ordered queue of work units; each invocation
//! loads the checkpoint, processes units in order until the wall-clock
//! budget (or per-invocation unit cap) is hit, persists after every unit,
//! and re-arms the scheduler before returning. A multi-hour job survives
//! being torn down and restarted dozens of times without duplicating work.
//!
//! Failure handling follows the quota-aware retry policy: capacity errors
//! pause the whole run with the cursor unmoved, anything else marks just
//! the current unit `error` and the loop continues.

use crate::config::EngineConfig;
use crate::constants::events;
use crate::error::{GapfillError, Result};
use crate::events::EventPublisher;
use crate::retry::{FailureClassifier, FailureKind, UnitError};
use crate::scheduler::Scheduler;
use crate::state::{
    clear_checkpoint, load_checkpoint, save_checkpoint, Checkpoint, JobStatus, StateStore,
    WorkUnit, WorkUnitStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Why a run returned without finishing the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Wall-clock budget exhausted before the next unit
    BudgetExhausted,
    /// Per-invocation unit cap reached
    UnitLimitReached,
    /// Upstream capacity exhausted mid-unit; same capacity is almost
    /// certainly still exhausted, so no further units were attempted
    CapacityExhausted,
}

/// Outcome of one invocation of the processor
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Progress persisted, scheduler re-armed, invocation exited cleanly
    Paused(PauseReason),
    /// Queue exhausted and completion callback fired
    Completed(CompletionSummary),
}

/// Final accounting for a completed job
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub job_name: String,
    pub units_processed: u64,
    pub units_failed: u64,
    pub accumulators: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counters produced by one successfully processed unit, merged into the
/// unit record and the job accumulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitReport {
    pub counters: BTreeMap<String, u64>,
}

impl UnitReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, key: impl Into<String>, value: u64) -> Self {
        self.counters.insert(key.into(), value);
        self
    }
}

/// The job-specific third of the engine: how to build the initial queue,
/// how to process one unit, and what to do when the queue is exhausted.
/// Everything else (checkpointing, budgets, pausing, rescheduling) is the
/// processor's business.
#[async_trait]
pub trait JobDescriptor: Send + Sync {
    /// Job-specific durable state carried in the checkpoint
    type Payload: Serialize + DeserializeOwned + Send + Sync;

    /// Stable job name; also the scheduler entry point and state key prefix
    fn name(&self) -> &str;

    /// Build the initial work queue and payload. Called once, on the first
    /// invocation with no stored checkpoint.
    async fn build_queue(&self) -> Result<(Vec<WorkUnit>, Self::Payload)>;

    /// Process one unit. Mutations to `payload` are persisted with the
    /// checkpoint only after this returns `Ok`, so a failed unit leaves no
    /// committed partial scan.
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        payload: &mut Self::Payload,
    ) -> std::result::Result<UnitReport, UnitError>;

    /// Completion callback: report generation, final notification. Runs
    /// once, after the terminal checkpoint persist and before the clear.
    async fn on_complete(&self, checkpoint: &Checkpoint<Self::Payload>) -> Result<()>;
}

/// The generic execution loop, bound to one job descriptor plus its store,
/// scheduler, and configuration.
pub struct ChunkedProcessor<J: JobDescriptor> {
    job: J,
    store: Arc<dyn StateStore>,
    scheduler: Scheduler,
    classifier: FailureClassifier,
    events: EventPublisher,
    config: EngineConfig,
}

impl<J: JobDescriptor> ChunkedProcessor<J> {
    pub fn new(
        job: J,
        store: Arc<dyn StateStore>,
        scheduler: Scheduler,
        config: EngineConfig,
    ) -> Self {
        let classifier = FailureClassifier::new(config.quota_signatures.clone());
        let events = EventPublisher::new(config.event_channel_capacity);
        Self {
            job,
            store,
            scheduler,
            classifier,
            events,
            config,
        }
    }

    /// Replace the event publisher (e.g. to share one channel across jobs)
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    /// Execute one invocation: load or initialize the checkpoint, process
    /// units until budget/cap/queue exhaustion, persist per unit, and
    /// either re-arm the scheduler (paused) or finalize (completed).
    pub async fn run(&self) -> Result<RunOutcome> {
        let invocation_started = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        let job_name = self.job.name().to_string();

        let mut checkpoint = match load_checkpoint::<J::Payload>(&*self.store, &job_name).await? {
            Some(found) if found.status == JobStatus::Completed => {
                // Crash window between the completion persist and the clear:
                // do not re-fire the completion callback, leave the
                // checkpoint for a manual reset.
                warn!(job_name = %job_name, "Loaded an already-completed checkpoint, short-circuiting");
                self.scheduler.disarm(&job_name).await?;
                return Ok(RunOutcome::Completed(Self::summary_of(&job_name, &found)));
            }
            Some(mut found) => {
                found.status = JobStatus::Running;
                info!(
                    job_name = %job_name,
                    cursor_index = found.cursor_index,
                    total_units = found.queue.len(),
                    "▶️ Resuming job from checkpoint"
                );
                self.events.publish(
                    events::JOB_RESUMED,
                    json!({ "job_name": job_name, "cursor_index": found.cursor_index }),
                );
                found
            }
            None => {
                let (queue, payload) = self.job.build_queue().await?;
                let fresh = Checkpoint::new(queue, payload);
                // Persisted before the first unit so a crash here still
                // leaves a queue to resume from.
                save_checkpoint(&*self.store, &job_name, &fresh).await?;
                info!(
                    job_name = %job_name,
                    total_units = fresh.queue.len(),
                    "🆕 Job initialized"
                );
                self.events.publish(
                    events::JOB_INITIALIZED,
                    json!({ "job_name": job_name, "total_units": fresh.queue.len() }),
                );
                fresh
            }
        };

        let mut units_this_invocation: u32 = 0;

        while !checkpoint.is_exhausted() {
            // Both limits are checked before starting a unit, never after,
            // so a unit is never abandoned mid-processing.
            if invocation_started.elapsed() >= budget {
                return self
                    .pause(
                        &job_name,
                        checkpoint,
                        PauseReason::BudgetExhausted,
                        self.config.resume_delay_minutes,
                    )
                    .await;
            }
            if let Some(cap) = self.config.max_units_per_invocation {
                if units_this_invocation >= cap {
                    return self
                        .pause(
                            &job_name,
                            checkpoint,
                            PauseReason::UnitLimitReached,
                            self.config.resume_delay_minutes,
                        )
                        .await;
                }
            }

            let index = checkpoint.cursor_index;
            // A unit paused by a previous capacity hit is re-attempted
            if checkpoint.queue[index].status == WorkUnitStatus::Paused {
                checkpoint.queue[index].status = WorkUnitStatus::Pending;
            }

            let unit = checkpoint.queue[index].clone();
            info!(
                job_name = %job_name,
                unit = %unit.key,
                position = index + 1,
                total_units = checkpoint.queue.len(),
                "Processing unit"
            );
            self.events.publish(
                events::UNIT_STARTED,
                json!({ "job_name": job_name, "unit": unit.key, "index": index }),
            );

            match self.job.process_unit(&unit, &mut checkpoint.payload).await {
                Ok(report) => {
                    let unit_record = &mut checkpoint.queue[index];
                    unit_record.status = WorkUnitStatus::Completed;
                    unit_record.error = None;
                    for (key, value) in &report.counters {
                        *unit_record.counters.entry(key.clone()).or_default() += value;
                        *checkpoint.accumulators.entry(key.clone()).or_default() += value;
                    }
                    checkpoint.cursor_index += 1;
                    checkpoint.units_processed += 1;
                    units_this_invocation += 1;

                    save_checkpoint(&*self.store, &job_name, &checkpoint).await?;
                    self.events.publish(
                        events::UNIT_COMPLETED,
                        json!({ "job_name": job_name, "unit": unit.key, "counters": report.counters }),
                    );

                    if self.config.unit_pacing_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.config.unit_pacing_ms))
                            .await;
                    }
                }
                Err(unit_error) => match self.classifier.classify(&unit_error) {
                    FailureKind::TransientCapacity => {
                        warn!(
                            job_name = %job_name,
                            unit = %unit.key,
                            error = %unit_error,
                            "⚠️ Upstream capacity exhausted, pausing run"
                        );
                        checkpoint.queue[index].status = WorkUnitStatus::Paused;
                        // cursor_index deliberately unchanged: this unit is
                        // re-attempted on resume
                        self.events.publish(
                            events::UNIT_PAUSED,
                            json!({ "job_name": job_name, "unit": unit.key, "error": unit_error.to_string() }),
                        );
                        return self
                            .pause(
                                &job_name,
                                checkpoint,
                                PauseReason::CapacityExhausted,
                                self.config.capacity_resume_delay_minutes,
                            )
                            .await;
                    }
                    FailureKind::PermanentForUnit => {
                        error!(
                            job_name = %job_name,
                            unit = %unit.key,
                            error = %unit_error,
                            "❌ Unit failed, skipping"
                        );
                        let unit_record = &mut checkpoint.queue[index];
                        unit_record.status = WorkUnitStatus::Error;
                        unit_record.error = Some(unit_error.to_string());
                        checkpoint.cursor_index += 1;
                        units_this_invocation += 1;

                        save_checkpoint(&*self.store, &job_name, &checkpoint).await?;
                        self.events.publish(
                            events::UNIT_FAILED,
                            json!({ "job_name": job_name, "unit": unit.key, "error": unit_error.to_string() }),
                        );
                    }
                },
            }
        }

        self.finalize(&job_name, checkpoint).await
    }

    /// Delete the checkpoint and disarm the scheduler. The next invocation
    /// rebuilds the queue from scratch. Never touches destination data
    /// already written by completed units.
    pub async fn reset(&self) -> Result<()> {
        let job_name = self.job.name();
        clear_checkpoint(&*self.store, job_name).await?;
        self.scheduler.disarm(job_name).await?;
        info!(job_name = %job_name, "🔄 Job reset");
        self.events
            .publish(events::JOB_RESET, json!({ "job_name": job_name }));
        Ok(())
    }

    async fn pause(
        &self,
        job_name: &str,
        mut checkpoint: Checkpoint<J::Payload>,
        reason: PauseReason,
        delay_minutes: u32,
    ) -> Result<RunOutcome> {
        checkpoint.status = JobStatus::Paused;
        save_checkpoint(&*self.store, job_name, &checkpoint).await?;
        self.scheduler.arm(job_name, delay_minutes).await?;

        info!(
            job_name = %job_name,
            reason = ?reason,
            cursor_index = checkpoint.cursor_index,
            remaining = checkpoint.remaining(),
            resume_delay_minutes = delay_minutes,
            "⏸️ Run paused, progress saved"
        );
        self.events.publish(
            events::JOB_PAUSED,
            json!({
                "job_name": job_name,
                "reason": format!("{reason:?}"),
                "cursor_index": checkpoint.cursor_index,
                "remaining": checkpoint.remaining(),
            }),
        );
        Ok(RunOutcome::Paused(reason))
    }

    async fn finalize(
        &self,
        job_name: &str,
        mut checkpoint: Checkpoint<J::Payload>,
    ) -> Result<RunOutcome> {
        checkpoint.status = JobStatus::Completed;
        checkpoint.completed_at = Some(Utc::now());
        save_checkpoint(&*self.store, job_name, &checkpoint).await?;

        let summary = Self::summary_of(job_name, &checkpoint);

        if let Err(callback_error) = self.job.on_complete(&checkpoint).await {
            // Leave the completed checkpoint in place for inspection, but
            // stop the re-invocation loop.
            self.scheduler.disarm(job_name).await?;
            error!(job_name = %job_name, error = %callback_error, "Completion callback failed");
            return Err(GapfillError::CompletionFailed {
                job_name: job_name.to_string(),
                reason: callback_error.to_string(),
            });
        }

        clear_checkpoint(&*self.store, job_name).await?;
        self.scheduler.disarm(job_name).await?;

        info!(
            job_name = %job_name,
            units_processed = summary.units_processed,
            units_failed = summary.units_failed,
            "✅ Job completed"
        );
        self.events.publish(
            events::JOB_COMPLETED,
            json!({
                "job_name": job_name,
                "units_processed": summary.units_processed,
                "units_failed": summary.units_failed,
            }),
        );
        Ok(RunOutcome::Completed(summary))
    }

    fn summary_of(job_name: &str, checkpoint: &Checkpoint<J::Payload>) -> CompletionSummary {
        CompletionSummary {
            job_name: job_name.to_string(),
            units_processed: checkpoint.units_processed,
            units_failed: checkpoint.units_failed(),
            accumulators: checkpoint.accumulators.clone(),
            started_at: checkpoint.started_at,
            completed_at: checkpoint.completed_at,
        }
    }
}
