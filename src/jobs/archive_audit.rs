//! Archive audit job: month-chunked scan of the raw-data archive.
//!
//! The initializer lists the month folders under the configured year folder
//! and snapshots the expected dimension set. Each unit scans one month's
//! date folders into the observation index. Completion reconciles against
//! the expected range, publishes the tabular report, and sends a completion
//! notification.

use crate::adapters::FileStoreAdapter;
use crate::engine::{CompletionSummary, JobDescriptor, UnitReport};
use crate::error::{GapfillError, Result};
use crate::jobs::CategoryMatcher;
use crate::notifications::{completion_body, NotificationSink};
use crate::reconciliation::{reconcile, ExpectedDateRange, ObservationIndex};
use crate::report::{archive_audit_report, ReportSink};
use crate::retry::UnitError;
use crate::state::{Checkpoint, WorkUnit};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable state for the archive audit: the dimension universe snapshotted
/// at job start (immutable for the run), the month-name to folder-id map,
/// and the incrementally built observation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveAuditPayload {
    pub expected_dimensions: Vec<String>,
    pub month_folders: BTreeMap<String, String>,
    pub observations: ObservationIndex,
}

pub struct ArchiveAuditJob {
    job_name: String,
    file_store: Arc<dyn FileStoreAdapter>,
    report_sink: Arc<dyn ReportSink>,
    notifications: Arc<dyn NotificationSink>,
    matcher: Arc<dyn CategoryMatcher>,
    /// Folder holding one subfolder per month for the audited year
    year_folder_id: String,
    expected_range: ExpectedDateRange,
    expected_dimensions: Vec<String>,
}

impl ArchiveAuditJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_name: impl Into<String>,
        file_store: Arc<dyn FileStoreAdapter>,
        report_sink: Arc<dyn ReportSink>,
        notifications: Arc<dyn NotificationSink>,
        matcher: Arc<dyn CategoryMatcher>,
        year_folder_id: impl Into<String>,
        expected_range: ExpectedDateRange,
        expected_dimensions: Vec<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            file_store,
            report_sink,
            notifications,
            matcher,
            year_folder_id: year_folder_id.into(),
            expected_range,
            expected_dimensions,
        }
    }
}

#[async_trait]
impl JobDescriptor for ArchiveAuditJob {
    type Payload = ArchiveAuditPayload;

    fn name(&self) -> &str {
        &self.job_name
    }

    async fn build_queue(&self) -> Result<(Vec<WorkUnit>, Self::Payload)> {
        let mut months = self
            .file_store
            .list_child_folders(&self.year_folder_id)
            .await
            .map_err(|e| GapfillError::InitializationFailed {
                job_name: self.job_name.clone(),
                reason: e.to_string(),
            })?;
        months.sort_by(|a, b| a.name.cmp(&b.name));

        let queue = months.iter().map(|m| WorkUnit::new(&m.name)).collect();
        let payload = ArchiveAuditPayload {
            expected_dimensions: self.expected_dimensions.clone(),
            month_folders: months.into_iter().map(|m| (m.name, m.id)).collect(),
            observations: ObservationIndex::new(),
        };
        Ok((queue, payload))
    }

    async fn process_unit(
        &self,
        unit: &WorkUnit,
        payload: &mut Self::Payload,
    ) -> std::result::Result<UnitReport, UnitError> {
        let folder_id = payload
            .month_folders
            .get(&unit.key)
            .cloned()
            .ok_or_else(|| UnitError::failed(format!("unknown month folder: {}", unit.key)))?;

        let mut files_matched: u64 = 0;
        let mut date_folders_scanned: u64 = 0;

        for date_folder in self.file_store.list_child_folders(&folder_id).await? {
            let Ok(date) = date_folder.name.parse::<NaiveDate>() else {
                debug!(folder = %date_folder.name, "Skipping non-date folder");
                continue;
            };
            date_folders_scanned += 1;

            for file in self.file_store.list_files(&date_folder.id).await? {
                if let Some(dimension) = self.matcher.category_for(&file.name) {
                    payload.observations.record(date, dimension);
                    files_matched += 1;
                }
            }
        }

        Ok(UnitReport::new()
            .count("files_matched", files_matched)
            .count("date_folders_scanned", date_folders_scanned))
    }

    async fn on_complete(&self, checkpoint: &Checkpoint<Self::Payload>) -> Result<()> {
        let statuses = reconcile(
            &self.expected_range,
            &checkpoint.payload.observations,
            &checkpoint.payload.expected_dimensions,
        );
        let report = archive_audit_report("Archive Audit", &statuses);
        let summary_line = report.summary.clone();
        self.report_sink.publish(&report).await?;

        let summary = CompletionSummary {
            job_name: self.job_name.clone(),
            units_processed: checkpoint.units_processed,
            units_failed: checkpoint.units_failed(),
            accumulators: checkpoint.accumulators.clone(),
            started_at: checkpoint.started_at,
            completed_at: checkpoint.completed_at,
        };
        let body = format!("{}\n{}", summary_line, completion_body(&summary));
        if let Err(e) = self
            .notifications
            .deliver("[ARCHIVE AUDIT] Scan complete", &body)
            .await
        {
            warn!(job_name = %self.job_name, error = %e, "Completion notification delivery failed");
        }
        Ok(())
    }
}
