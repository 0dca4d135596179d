//! Report audit job: presence check for dated report files.
//!
//! Month-chunked like the archive audit, but file-level instead of
//! dimension-level: each unit scans one month folder and records which
//! expected dates have a report file carrying that date in its name.
//! Completion publishes the found/missing presence table.

use crate::adapters::{FileEntry, FileStoreAdapter};
use crate::engine::{JobDescriptor, UnitReport};
use crate::error::{GapfillError, Result};
use crate::jobs::date_in_filename;
use crate::reconciliation::{reconcile, ExpectedDateRange, ObservationIndex};
use crate::report::{presence_report, ReportSink};
use crate::retry::UnitError;
use crate::state::{Checkpoint, WorkUnit};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Durable state for the report audit: month folder ids plus the dated
/// files discovered so far. First file found for a date wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAuditPayload {
    pub month_folders: BTreeMap<String, String>,
    pub found: BTreeMap<NaiveDate, FileEntry>,
}

pub struct ReportAuditJob {
    job_name: String,
    file_store: Arc<dyn FileStoreAdapter>,
    report_sink: Arc<dyn ReportSink>,
    /// Folder holding one subfolder per month of generated reports
    reports_folder_id: String,
    expected_range: ExpectedDateRange,
}

impl ReportAuditJob {
    pub fn new(
        job_name: impl Into<String>,
        file_store: Arc<dyn FileStoreAdapter>,
        report_sink: Arc<dyn ReportSink>,
        reports_folder_id: impl Into<String>,
        expected_range: ExpectedDateRange,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            file_store,
            report_sink,
            reports_folder_id: reports_folder_id.into(),
            expected_range,
        }
    }
}

#[async_trait]
impl JobDescriptor for ReportAuditJob {
    type Payload = ReportAuditPayload;

    fn name(&self) -> &str {
        &self.job_name
    }

    async fn build_queue(&self) -> Result<(Vec<WorkUnit>, Self::Payload)> {
        let mut months = self
            .file_store
            .list_child_folders(&self.reports_folder_id)
            .await
            .map_err(|e| GapfillError::InitializationFailed {
                job_name: self.job_name.clone(),
                reason: e.to_string(),
            })?;
        months.sort_by(|a, b| a.name.cmp(&b.name));

        let queue = months.iter().map(|m| WorkUnit::new(&m.name)).collect();
        let payload = ReportAuditPayload {
            month_folders: months.into_iter().map(|m| (m.name, m.id)).collect(),
            found: BTreeMap::new(),
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

        let mut files_scanned: u64 = 0;
        let mut dated_files: u64 = 0;

        for file in self.file_store.list_files(&folder_id).await? {
            files_scanned += 1;
            let Some(date) = date_in_filename(&file.name) else {
                continue;
            };
            dated_files += 1;
            payload.found.entry(date).or_insert(file);
        }

        Ok(UnitReport::new()
            .count("files_scanned", files_scanned)
            .count("dated_files", dated_files))
    }

    async fn on_complete(&self, checkpoint: &Checkpoint<Self::Payload>) -> Result<()> {
        let mut observations = ObservationIndex::new();
        for (date, file) in &checkpoint.payload.found {
            observations.record(*date, file.name.clone());
        }
        // Empty dimension set: any file on the date counts as presence
        let statuses = reconcile(&self.expected_range, &observations, &[]);
        let report = presence_report("Report Audit", &statuses, &checkpoint.payload.found);
        self.report_sink.publish(&report).await
    }
}
