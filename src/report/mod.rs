//! # Report Building
//!
//! Pure, stateless rendering of reconciliation results into an ordered
//! tabular report, plus the [`ReportSink`] seam the completion callbacks
//! publish through. The sink is a render target only; nothing in the core
//! consults it for decisions.

use crate::adapters::FileEntry;
use crate::error::Result;
use crate::reconciliation::{DateStatus, DateStatusKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// A finished tabular report: ordered rows plus a merged summary line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub summary: String,
}

/// Render target for finished reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &Report) -> Result<()>;
}

/// Sink that logs the summary line; useful default for headless runs.
#[derive(Debug, Default)]
pub struct LoggingReportSink;

#[async_trait]
impl ReportSink for LoggingReportSink {
    async fn publish(&self, report: &Report) -> Result<()> {
        info!(
            title = %report.title,
            rows = report.rows.len(),
            summary = %report.summary,
            "📊 Report published"
        );
        Ok(())
    }
}

fn status_label(kind: DateStatusKind) -> &'static str {
    match kind {
        DateStatusKind::Complete => "COMPLETE",
        DateStatusKind::Partial => "PARTIAL",
        DateStatusKind::Missing => "MISSING",
    }
}

/// Build the archive audit report: one row per expected date with the
/// per-date verdict, observed counts, missing dimensions, and action hint.
pub fn archive_audit_report(title: impl Into<String>, statuses: &[DateStatus]) -> Report {
    let mut rows = Vec::with_capacity(statuses.len());
    let mut complete = 0usize;
    let mut partial = 0usize;
    let mut missing = 0usize;

    for status in statuses {
        let (missing_cell, action) = match status.kind {
            DateStatusKind::Complete => {
                complete += 1;
                ("—".to_string(), "—")
            }
            DateStatusKind::Partial => {
                partial += 1;
                (status.missing_dimensions.join(", "), "Run gap fill")
            }
            DateStatusKind::Missing => {
                missing += 1;
                ("All dimensions".to_string(), "Backfill required")
            }
        };

        rows.push(vec![
            status.date.to_string(),
            status_label(status.kind).to_string(),
            status.files_seen.to_string(),
            status.dimensions_found.to_string(),
            missing_cell,
            action.to_string(),
        ]);
    }

    Report {
        title: title.into(),
        columns: vec![
            "Date".to_string(),
            "Status".to_string(),
            "Files Found".to_string(),
            "Dimensions Found".to_string(),
            "Missing Dimensions".to_string(),
            "Action".to_string(),
        ],
        rows,
        summary: format!(
            "Archive audit: {complete} complete | {partial} partial | {missing} missing | Total: {} days",
            statuses.len()
        ),
    }
}

/// Build the presence report for the report-audit job: one row per expected
/// date, found dates carrying the file name and link.
pub fn presence_report(
    title: impl Into<String>,
    statuses: &[DateStatus],
    found_files: &BTreeMap<NaiveDate, FileEntry>,
) -> Report {
    let mut rows = Vec::with_capacity(statuses.len());
    let mut found = 0usize;
    let mut missing = 0usize;

    for status in statuses {
        match found_files.get(&status.date) {
            Some(file) if status.kind == DateStatusKind::Complete => {
                found += 1;
                rows.push(vec![
                    status.date.to_string(),
                    "FOUND".to_string(),
                    file.name.clone(),
                    file.url.clone(),
                ]);
            }
            _ => {
                missing += 1;
                rows.push(vec![
                    status.date.to_string(),
                    "MISSING".to_string(),
                    "—".to_string(),
                    "—".to_string(),
                ]);
            }
        }
    }

    Report {
        title: title.into(),
        columns: vec![
            "Date".to_string(),
            "Status".to_string(),
            "File".to_string(),
            "Link".to_string(),
        ],
        rows,
        summary: format!(
            "Report audit: {found} found | {missing} missing | Total: {} days",
            statuses.len()
        ),
    }
}
