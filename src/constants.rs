//! # System Constants
//!
//! Core constants that define the operational boundaries of the gap-fill
//! engine: persisted-state key layout, lifecycle event names, and the
//! built-in defaults the configuration layer starts from.

/// Lifecycle events published by the chunked processor
pub mod events {
    // Job lifecycle events
    pub const JOB_INITIALIZED: &str = "job.initialized";
    pub const JOB_RESUMED: &str = "job.resumed";
    pub const JOB_PAUSED: &str = "job.paused";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_RESET: &str = "job.reset";

    // Work unit lifecycle events
    pub const UNIT_STARTED: &str = "unit.started";
    pub const UNIT_COMPLETED: &str = "unit.completed";
    pub const UNIT_FAILED: &str = "unit.failed";
    pub const UNIT_PAUSED: &str = "unit.paused";
}

/// Persisted-state key layout.
///
/// Every job sharing one [`StateStore`](crate::state::StateStore) gets its own
/// namespace; these helpers are the only place key shapes are defined.
pub mod keys {
    /// Checkpoint for a job
    pub fn checkpoint(job_name: &str) -> String {
        format!("{job_name}::checkpoint")
    }

    /// One-shot re-invocation trigger handle for a job
    pub fn trigger(job_name: &str) -> String {
        format!("{job_name}::trigger")
    }

    /// Daily stats record for a job family
    pub fn daily_stats(family: &str) -> String {
        format!("{family}::daily_stats")
    }

    /// Daily recurring trigger handle (progress notifications)
    pub fn daily_trigger(name: &str) -> String {
        format!("{name}::daily_trigger")
    }
}

/// Built-in defaults, overridable through [`EngineConfig`](crate::config::EngineConfig)
pub mod defaults {
    /// Wall-clock budget for a single invocation (5.5 minutes)
    pub const TIME_BUDGET_MS: u64 = 330_000;

    /// Delay before re-invoking after a budget or unit-cap pause
    pub const RESUME_DELAY_MINUTES: u32 = 1;

    /// Delay before re-invoking after an upstream capacity pause
    pub const CAPACITY_RESUME_DELAY_MINUTES: u32 = 10;

    /// Pacing sleep between successive units within one invocation
    pub const UNIT_PACING_MS: u64 = 100;

    /// Lower clamp for trigger delays
    pub const MIN_TRIGGER_DELAY_MINUTES: u32 = 1;

    /// Upper clamp for trigger delays
    pub const MAX_TRIGGER_DELAY_MINUTES: u32 = 10;

    /// Error-message substrings treated as upstream quota exhaustion.
    ///
    /// Matched case-insensitively. The deployed set is configuration
    /// (`quota_signatures`); these are only the shipped defaults.
    pub const QUOTA_SIGNATURES: &[&str] =
        &["service invoked too many times", "quota", "rate limit"];

    /// Broadcast capacity of the lifecycle event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}
