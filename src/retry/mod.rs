//! # Quota-Aware Retry Policy
//!
//! Classifies a unit handler failure as transient capacity exhaustion
//! (job-wide: pause the whole run and resume later) or permanent for the
//! unit (unit-local: record, skip, continue). This asymmetry is the central
//! correctness property of the engine's failure handling: capacity errors
//! stop the loop, content errors must not.

use crate::adapters::AdapterError;
use crate::constants::defaults;
use thiserror::Error;

/// Failure raised by a job's unit handler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    /// Upstream rate/quota limit hit while processing the unit
    #[error("Upstream capacity exhausted: {message}")]
    CapacityExhausted { message: String },

    /// Anything else: malformed data, unexpected shape, transient network
    /// blip below quota
    #[error("{message}")]
    Failed { message: String },
}

impl UnitError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl From<AdapterError> for UnitError {
    fn from(error: AdapterError) -> Self {
        match error {
            AdapterError::CapacityExhausted { message } => Self::CapacityExhausted { message },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }
}

/// Classification outcome for a unit failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Job-wide and transient: pause the run, keep the cursor, resume later
    TransientCapacity,
    /// Unit-local: mark the unit `error`, advance past it, keep going
    PermanentForUnit,
}

/// Signature-based failure classifier.
///
/// Structurally-typed capacity errors always classify transient. For
/// everything else the error text is matched case-insensitively against the
/// configured signature list - upstream services that only speak strings
/// get classified here, and the signature set is configuration so wording
/// changes don't silently stop classifying.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    signatures: Vec<String>,
}

impl FailureClassifier {
    pub fn new(signatures: impl IntoIterator<Item = String>) -> Self {
        Self {
            signatures: signatures
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, error: &UnitError) -> FailureKind {
        match error {
            UnitError::CapacityExhausted { .. } => FailureKind::TransientCapacity,
            UnitError::Failed { message } => {
                let text = message.to_lowercase();
                if self.signatures.iter().any(|sig| text.contains(sig)) {
                    FailureKind::TransientCapacity
                } else {
                    FailureKind::PermanentForUnit
                }
            }
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(defaults::QUOTA_SIGNATURES.iter().map(|s| (*s).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_capacity_always_transient() {
        // Even with an empty signature list the typed variant classifies
        let classifier = FailureClassifier::new(Vec::<String>::new());
        let error = UnitError::CapacityExhausted {
            message: "no signature match here".to_string(),
        };
        assert_eq!(classifier.classify(&error), FailureKind::TransientCapacity);
    }

    #[test]
    fn test_default_signatures_match_case_insensitively() {
        let classifier = FailureClassifier::default();

        for message in [
            "Service invoked too many times in one day: gmail",
            "User-rate QUOTA exceeded",
            "Rate Limit Exceeded (429)",
        ] {
            let error = UnitError::failed(message);
            assert_eq!(
                classifier.classify(&error),
                FailureKind::TransientCapacity,
                "expected transient for: {message}"
            );
        }
    }

    #[test]
    fn test_other_errors_are_permanent_for_unit() {
        let classifier = FailureClassifier::default();

        for message in [
            "attachment payload was not valid CSV",
            "folder 2025-05-01 not found",
            "connection reset by peer",
        ] {
            let error = UnitError::failed(message);
            assert_eq!(
                classifier.classify(&error),
                FailureKind::PermanentForUnit,
                "expected permanent for: {message}"
            );
        }
    }

    #[test]
    fn test_configured_signatures_extend_matching() {
        let classifier = FailureClassifier::new(vec!["backend throttled".to_string()]);
        let error = UnitError::failed("Backend Throttled: retry later");
        assert_eq!(classifier.classify(&error), FailureKind::TransientCapacity);
    }

    #[test]
    fn test_adapter_error_conversion_preserves_capacity() {
        let capacity: UnitError = AdapterError::capacity_exhausted("limit hit").into();
        assert!(matches!(capacity, UnitError::CapacityExhausted { .. }));

        let other: UnitError = AdapterError::upstream("boom").into();
        assert!(matches!(other, UnitError::Failed { .. }));
    }
}
