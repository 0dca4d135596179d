//! Gap fill job: day-chunked backfill from the message store.
//!
//! Each unit covers one missing date: search the message store with the
//! date-templated query, save every attachment into the per-date archive
//! folder, and record the day's activity in the daily stats. The queue
//! comes either from a raw date range or from a prior audit's verdicts.

use crate::adapters::{FileStoreAdapter, MessageStoreAdapter};
use crate::engine::{CompletionSummary, JobDescriptor, UnitReport};
use crate::error::Result;
use crate::notifications::{completion_body, NotificationSink};
use crate::reconciliation::{DateStatus, DateStatusKind, ExpectedDateRange};
use crate::retry::UnitError;
use crate::state::{Checkpoint, DailyStatsTracker, WorkUnit};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the gap fill queue comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum GapFillQueueSource {
    /// Every date in the range, oldest first
    Range(ExpectedDateRange),
    /// An explicit date list, processed in the order given
    Dates(Vec<NaiveDate>),
}

impl GapFillQueueSource {
    /// Build the queue from audit verdicts: every date judged missing or
    /// partial needs a fill pass.
    pub fn from_reconciliation(statuses: &[DateStatus]) -> Self {
        Self::Dates(
            statuses
                .iter()
                .filter(|s| s.kind != DateStatusKind::Complete)
                .map(|s| s.date)
                .collect(),
        )
    }

    fn dates(&self) -> Vec<NaiveDate> {
        match self {
            Self::Range(range) => range.dates(),
            Self::Dates(dates) => dates.clone(),
        }
    }
}

/// Durable state for the gap fill: the resolved destination folder ids,
/// cached so resumed invocations skip the lookup chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapFillPayload {
    pub folder_cache: BTreeMap<String, String>,
}

pub struct GapFillJob {
    job_name: String,
    message_store: Arc<dyn MessageStoreAdapter>,
    file_store: Arc<dyn FileStoreAdapter>,
    notifications: Arc<dyn NotificationSink>,
    stats: DailyStatsTracker,
    /// Root of the archive tree; per-date folders are created under
    /// `<root>/<year>/<month name>/<date>`
    root_folder_id: String,
    /// Message search query with a `{date}` placeholder
    query_template: String,
    source: GapFillQueueSource,
}

impl GapFillJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_name: impl Into<String>,
        message_store: Arc<dyn MessageStoreAdapter>,
        file_store: Arc<dyn FileStoreAdapter>,
        notifications: Arc<dyn NotificationSink>,
        stats: DailyStatsTracker,
        root_folder_id: impl Into<String>,
        query_template: impl Into<String>,
        source: GapFillQueueSource,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            message_store,
            file_store,
            notifications,
            stats,
            root_folder_id: root_folder_id.into(),
            query_template: query_template.into(),
            source,
        }
    }

    /// Resolve (and cache) the destination folder for `date`, creating the
    /// year/month/date chain as needed.
    async fn destination_folder(
        &self,
        date: NaiveDate,
        cache: &mut BTreeMap<String, String>,
    ) -> std::result::Result<String, UnitError> {
        let date_key = date.to_string();
        if let Some(id) = cache.get(&date_key) {
            return Ok(id.clone());
        }

        let year = self
            .file_store
            .ensure_child_folder(&self.root_folder_id, &date.format("%Y").to_string())
            .await?;
        let month = self
            .file_store
            .ensure_child_folder(&year.id, &date.format("%B").to_string())
            .await?;
        let day = self
            .file_store
            .ensure_child_folder(&month.id, &date_key)
            .await?;
        cache.insert(date_key, day.id.clone());
        Ok(day.id)
    }

    fn saved_kind(name: &str) -> &'static str {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            "csvs_saved"
        } else if lower.ends_with(".zip") {
            "zips_saved"
        } else {
            "others_saved"
        }
    }

    /// Fold the unit's activity into today's stats. Stats are advisory, so
    /// a store failure here is logged rather than failing the unit.
    async fn record_daily_activity(&self, date_key: &str, saved: &BTreeMap<&'static str, u64>) {
        let result = async {
            let mut stats = self.stats.today().await?;
            stats.searches_performed += 1;
            for (kind, count) in saved {
                let kind = kind.trim_end_matches("s_saved");
                stats.record_saved(kind, *count);
            }
            stats.dates_completed.push(date_key.to_string());
            self.stats.save(&stats).await
        }
        .await;

        if let Err(e) = result {
            warn!(job_name = %self.job_name, error = %e, "Daily stats update failed");
        }
    }
}

#[async_trait]
impl JobDescriptor for GapFillJob {
    type Payload = GapFillPayload;

    fn name(&self) -> &str {
        &self.job_name
    }

    async fn build_queue(&self) -> Result<(Vec<WorkUnit>, Self::Payload)> {
        let queue = self
            .source
            .dates()
            .iter()
            .map(|date| WorkUnit::new(date.to_string()))
            .collect();
        Ok((queue, GapFillPayload::default()))
    }

    async fn process_unit(
        &self,
        unit: &WorkUnit,
        payload: &mut Self::Payload,
    ) -> std::result::Result<UnitReport, UnitError> {
        let date: NaiveDate = unit
            .key
            .parse()
            .map_err(|_| UnitError::failed(format!("unit key is not a date: {}", unit.key)))?;

        let query = self.query_template.replace("{date}", &unit.key);
        let messages = self.message_store.search(&query).await?;
        debug!(
            date = %unit.key,
            messages = messages.len(),
            "🔍 Message search complete"
        );

        let folder_id = self.destination_folder(date, &mut payload.folder_cache).await?;

        let mut saved: BTreeMap<&'static str, u64> = BTreeMap::new();
        for message in &messages {
            for attachment in &message.attachments {
                self.file_store
                    .save_attachment(&folder_id, &attachment.name, &attachment.bytes)
                    .await?;
                *saved.entry(Self::saved_kind(&attachment.name)).or_default() += 1;
            }
        }

        self.record_daily_activity(&unit.key, &saved).await;

        let mut report = UnitReport::new().count("searches", 1);
        for (kind, count) in saved {
            report = report.count(kind, count);
        }
        Ok(report)
    }

    async fn on_complete(&self, checkpoint: &Checkpoint<Self::Payload>) -> Result<()> {
        let summary = CompletionSummary {
            job_name: self.job_name.clone(),
            units_processed: checkpoint.units_processed,
            units_failed: checkpoint.units_failed(),
            accumulators: checkpoint.accumulators.clone(),
            started_at: checkpoint.started_at,
            completed_at: checkpoint.completed_at,
        };
        if let Err(e) = self
            .notifications
            .deliver("[GAP FILL] Backfill complete", &completion_body(&summary))
            .await
        {
            warn!(job_name = %self.job_name, error = %e, "Completion notification delivery failed");
        }
        Ok(())
    }
}
