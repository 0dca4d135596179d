//! # Notifications
//!
//! Outbound progress and completion notifications. Bodies are pure string
//! builders over the daily stats and progress snapshot; delivery goes
//! through the [`NotificationSink`] seam and is fire-and-forget from the
//! engine's perspective - failures are logged, never fatal to the job.

use crate::engine::CompletionSummary;
use crate::error::Result;
use crate::state::{DailyStats, DailyStatsTracker, ProgressSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Delivery seam for outbound notifications (email, chat, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, subject: &str, body: &str) -> Result<()>;
}

/// Sink that logs the subject line; useful default for headless runs.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn deliver(&self, subject: &str, body: &str) -> Result<()> {
        info!(subject = %subject, body_len = body.len(), "📧 Notification delivered");
        Ok(())
    }
}

/// Whole-day rate-based ETA in days, rounded up. None when no progress has
/// been made yet.
fn estimate_days_remaining(progress: &ProgressSnapshot) -> Option<u64> {
    let remaining = progress.remaining();
    if progress.completed == 0 || remaining == 0 {
        return None;
    }
    let elapsed = Utc::now().signed_duration_since(progress.started_at);
    let days_elapsed = (elapsed.num_days().max(0) as u64).max(1);
    let rate_per_day = progress.completed as f64 / days_elapsed as f64;
    if rate_per_day <= 0.0 {
        return None;
    }
    Some((remaining as f64 / rate_per_day).ceil() as u64)
}

/// Build the daily progress notification body.
pub fn daily_progress_body(stats: &DailyStats, progress: Option<&ProgressSnapshot>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Daily progress report for {}", stats.date);
    let _ = writeln!(body);
    let _ = writeln!(body, "Today's activity:");
    let _ = writeln!(body, "  Searches performed: {}", stats.searches_performed);
    for (kind, count) in &stats.saved_by_kind {
        let _ = writeln!(body, "  {kind} files saved: {count}");
    }
    let _ = writeln!(body, "  Dates completed: {}", stats.dates_completed.len());

    if stats.dates_completed.is_empty() {
        let _ = writeln!(body);
        let _ = writeln!(body, "No dates completed yet today.");
    } else {
        let _ = writeln!(body);
        let _ = writeln!(body, "Dates completed today:");
        for date in &stats.dates_completed {
            let _ = writeln!(body, "  {date}");
        }
    }

    if let Some(progress) = progress {
        let _ = writeln!(body);
        let _ = writeln!(body, "Overall progress:");
        let _ = writeln!(
            body,
            "  Completed: {}/{} units ({:.1}%)",
            progress.completed,
            progress.total_units,
            progress.percent_complete()
        );
        let _ = writeln!(body, "  Remaining: {}", progress.remaining());
        if progress.failed > 0 {
            let _ = writeln!(body, "  Failed and skipped: {}", progress.failed);
        }
        if let (Some(first), Some(last)) = (&progress.first_key, &progress.last_key) {
            let _ = writeln!(body, "  Range: {first} to {last}");
        }
        let _ = writeln!(body, "  Status: {}", progress.status);
        if let Some(days) = estimate_days_remaining(progress) {
            let _ = writeln!(body, "  Estimated time remaining: ~{days} days");
        }
    }

    body
}

/// Build the completion notification body.
pub fn completion_body(summary: &CompletionSummary) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Job {} completed.", summary.job_name);
    let _ = writeln!(body);
    let _ = writeln!(body, "Final statistics:");
    let _ = writeln!(body, "  Units processed: {}", summary.units_processed);
    if summary.units_failed > 0 {
        let _ = writeln!(body, "  Units failed and skipped: {}", summary.units_failed);
    }
    for (key, value) in &summary.accumulators {
        let _ = writeln!(body, "  {key}: {value}");
    }
    let _ = writeln!(body, "  Started: {}", summary.started_at.to_rfc3339());
    if let Some(completed_at) = summary.completed_at {
        let _ = writeln!(body, "  Completed: {}", completed_at.to_rfc3339());
    }
    body
}

/// Daily progress sender, deduplicated to at most one notification per
/// calendar day via the stats record's `last_notified` marker.
#[derive(Clone)]
pub struct DailyNotifier {
    tracker: DailyStatsTracker,
    sink: Arc<dyn NotificationSink>,
    subject_prefix: String,
}

impl DailyNotifier {
    pub fn new(
        tracker: DailyStatsTracker,
        sink: Arc<dyn NotificationSink>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            sink,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Send today's progress notification unless one already went out
    /// today. Returns whether a notification was sent.
    pub async fn send_daily_progress(
        &self,
        progress: Option<&ProgressSnapshot>,
    ) -> Result<bool> {
        let mut stats = self.tracker.today().await?;
        let today = stats.date;

        if stats.last_notified == Some(today) {
            info!(family = %self.tracker.family(), "Daily notification already sent today");
            return Ok(false);
        }

        let subject = format!("{} Daily Progress Report - {today}", self.subject_prefix);
        let body = daily_progress_body(&stats, progress);

        match self.sink.deliver(&subject, &body).await {
            Ok(()) => {
                stats.last_notified = Some(today);
                self.tracker.save(&stats).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(family = %self.tracker.family(), error = %e, "Daily notification delivery failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{JobStatus, MemoryStateStore};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn sample_progress() -> ProgressSnapshot {
        ProgressSnapshot {
            total_units: 100,
            completed: 25,
            failed: 2,
            started_at: Utc::now() - chrono::Duration::days(5),
            status: JobStatus::Paused,
            first_key: Some("2025-05-01".to_string()),
            last_key: Some("2025-08-08".to_string()),
        }
    }

    #[test]
    fn test_daily_progress_body_contents() {
        let mut stats = DailyStats::fresh(day("2025-06-10"));
        stats.searches_performed = 7;
        stats.record_saved("csv", 12);
        stats.record_saved("zip", 3);
        stats.dates_completed.push("2025-05-14".to_string());

        let body = daily_progress_body(&stats, Some(&sample_progress()));
        assert!(body.contains("Searches performed: 7"));
        assert!(body.contains("csv files saved: 12"));
        assert!(body.contains("zip files saved: 3"));
        assert!(body.contains("2025-05-14"));
        assert!(body.contains("Completed: 25/100 units (25.0%)"));
        assert!(body.contains("Remaining: 75"));
        assert!(body.contains("Failed and skipped: 2"));
        assert!(body.contains("Estimated time remaining: ~15 days"));
    }

    #[test]
    fn test_eta_absent_without_progress() {
        let progress = ProgressSnapshot {
            completed: 0,
            ..sample_progress()
        };
        assert_eq!(estimate_days_remaining(&progress), None);
    }

    #[test]
    fn test_completion_body_contents() {
        let summary = CompletionSummary {
            job_name: "gap_fill".to_string(),
            units_processed: 42,
            units_failed: 1,
            accumulators: BTreeMap::from([
                ("csvs_saved".to_string(), 120u64),
                ("zips_saved".to_string(), 30u64),
            ]),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };

        let body = completion_body(&summary);
        assert!(body.contains("Job gap_fill completed."));
        assert!(body.contains("Units processed: 42"));
        assert!(body.contains("csvs_saved: 120"));
        assert!(body.contains("Units failed and skipped: 1"));
    }

    #[tokio::test]
    async fn test_daily_notifier_deduplicates_per_day() {
        let store = Arc::new(MemoryStateStore::new());
        let tracker = DailyStatsTracker::new(store, "gap_fill");
        let notifier = DailyNotifier::new(
            tracker.clone(),
            Arc::new(LoggingNotificationSink),
            "[GAP FILL]",
        );

        assert!(notifier.send_daily_progress(None).await.unwrap());
        // Second send the same day is suppressed
        assert!(!notifier.send_daily_progress(None).await.unwrap());

        let stats = tracker.today().await.unwrap();
        assert_eq!(stats.last_notified, Some(stats.date));
    }
}
