//! # Concrete Jobs
//!
//! The three job shapes built on the chunked processor: a month-chunked
//! archive audit, a day-chunked gap fill, and a month-chunked report
//! presence audit. Each is a thin [`JobDescriptor`](crate::engine::JobDescriptor)
//! over the same engine; all pause/resume/checkpoint mechanics live there.

pub mod archive_audit;
pub mod gap_fill;
pub mod report_audit;

pub use archive_audit::{ArchiveAuditJob, ArchiveAuditPayload};
pub use gap_fill::{GapFillJob, GapFillPayload, GapFillQueueSource};
pub use report_audit::{ReportAuditJob, ReportAuditPayload};

use chrono::NaiveDate;

/// Maps a filename to the dimension (category) identifier it belongs to.
/// Deliberately a small, swappable seam: the exact lookup is deployment
/// business, not engine business.
pub trait CategoryMatcher: Send + Sync {
    fn category_for(&self, filename: &str) -> Option<String>;
}

/// Matcher that attributes a file to the first known dimension identifier
/// appearing as a substring of the filename.
#[derive(Debug, Clone)]
pub struct SubstringCategoryMatcher {
    dimensions: Vec<String>,
}

impl SubstringCategoryMatcher {
    pub fn new(dimensions: Vec<String>) -> Self {
        Self { dimensions }
    }
}

impl CategoryMatcher for SubstringCategoryMatcher {
    fn category_for(&self, filename: &str) -> Option<String> {
        self.dimensions
            .iter()
            .find(|dim| filename.contains(dim.as_str()))
            .cloned()
    }
}

/// Extract the first `YYYY-MM-DD` date embedded in a filename.
pub(crate) fn date_in_filename(filename: &str) -> Option<NaiveDate> {
    let bytes = filename.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    for start in 0..=(bytes.len() - 10) {
        let window = &bytes[start..start + 10];
        let shaped = window[4] == b'-'
            && window[7] == b'-'
            && window
                .iter()
                .enumerate()
                .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit());
        if !shaped {
            continue;
        }
        // All-ASCII window, so the slice is on char boundaries
        if let Ok(date) =
            NaiveDate::parse_from_str(&filename[start..start + 10], "%Y-%m-%d")
        {
            return Some(date);
        }
    }
    None
}
