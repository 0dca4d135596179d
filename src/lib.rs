#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Gapfill Core
//!
//! Resumable, chunked execution engine for reconciling dated records against
//! a hierarchical file archive and driving a backfill from a searchable
//! message store.
//!
//! ## Overview
//!
//! Long-running archive work (auditing a year of daily data, backfilling
//! months of missing days) cannot finish inside one bounded invocation.
//! The engine decomposes each job into an ordered queue of work units,
//! checkpoints durable state after every unit, and re-arms a one-shot
//! scheduler trigger before yielding, so a multi-hour job completes across
//! dozens of short invocations with at most one unit of repeated work after
//! a crash.
//!
//! ## Module Organization
//!
//! - [`engine`] - The chunked processor: budgets, checkpoints, pause/resume
//! - [`state`] - Checkpoint model, durable key-value stores, daily stats
//! - [`scheduler`] - Self-rescheduling trigger management
//! - [`retry`] - Quota-aware failure classification
//! - [`reconciliation`] - Pure expected-vs-observed date diffing
//! - [`jobs`] - The concrete audit and gap-fill job descriptors
//! - [`adapters`] - File store and message store trait seams
//! - [`report`] - Tabular report building and publishing
//! - [`notifications`] - Daily progress and completion notifications
//! - [`events`] - Lifecycle event broadcasting
//! - [`config`] - Layered engine configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gapfill_core::config::EngineConfig;
//! use gapfill_core::engine::ChunkedProcessor;
//! use gapfill_core::scheduler::{Scheduler, TokioSchedulerBackend};
//! use gapfill_core::state::MemoryStateStore;
//! use std::sync::Arc;
//!
//! # use gapfill_core::jobs::GapFillJob;
//! # async fn example(job: GapFillJob) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStateStore::new());
//! let backend = Arc::new(TokioSchedulerBackend::new());
//! let scheduler = Scheduler::new(store.clone(), backend);
//!
//! let processor = ChunkedProcessor::new(job, store, scheduler, EngineConfig::default());
//! let outcome = processor.run().await?;
//! println!("outcome: {outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod jobs;
pub mod logging;
pub mod notifications;
pub mod reconciliation;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use config::EngineConfig;
pub use engine::{ChunkedProcessor, JobDescriptor, PauseReason, RunOutcome, UnitReport};
pub use error::{GapfillError, Result};
pub use scheduler::{Scheduler, SchedulerBackend, TokioSchedulerBackend};
pub use state::{Checkpoint, JobStatus, StateStore, WorkUnit, WorkUnitStatus};
