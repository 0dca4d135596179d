//! # Durable Job State
//!
//! Everything a job persists between invocations lives here: the
//! [`StateStore`] trait the engine round-trips through, the typed
//! [`Checkpoint`] snapshot, and the calendar-day-scoped [`DailyStats`]
//! accumulator. There is deliberately no in-memory caching layer - the
//! store is the source of truth across crashes, not a cache of it.

pub mod checkpoint;
pub mod daily_stats;
pub mod store;

pub use checkpoint::{
    clear_checkpoint, load_checkpoint, save_checkpoint, Checkpoint, JobStatus, ProgressSnapshot,
    WorkUnit, WorkUnitStatus,
};
pub use daily_stats::{DailyStats, DailyStatsTracker};
pub use store::{FileStateStore, MemoryStateStore, StateStore};
