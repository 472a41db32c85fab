//! Run outcome reporting.

use chrono::{DateTime, Utc};
use importkit_shared::{ElementId, PersistError, RunId, TransformError};
use serde::{Deserialize, Serialize};

/// Why a single row did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum RowError {
    Transform(TransformError),
    Persist(PersistError),
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transform(e) => write!(f, "{e}"),
            Self::Persist(e) => write!(f, "{e}"),
        }
    }
}

/// A row that failed, with its position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub element: ElementId,
    /// Zero-based index into the element's rows.
    pub row_index: usize,
    pub cause: RowError,
}

/// Summary of one pipeline run.
///
/// `attempted == succeeded + failed` always holds, and `failures` is ordered
/// by element (batch order) then row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<RowFailure>,
    /// Elements whose rows never ran (unpublished, or not started before
    /// cancellation).
    pub elements_skipped: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// True when every attempted row committed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What one element task produced; merged into the [`RunReport`].
#[derive(Debug, Default)]
pub(crate) struct ElementOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RowFailure>,
    pub skipped: bool,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use importkit_shared::ColumnIndex;

    #[test]
    fn row_error_serializes_with_stage_tag() {
        let failure = RowFailure {
            element: ElementId::from("p-1"),
            row_index: 2,
            cause: RowError::Transform(TransformError::new("integer", ColumnIndex(1), "bad format")),
        };
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["element"], "p-1");
        assert_eq!(json["row_index"], 2);
        assert_eq!(json["cause"]["stage"], "transform");
        assert_eq!(json["cause"]["operator_kind"], "integer");
        assert_eq!(json["cause"]["cause"], "bad format");

        let back: RowFailure = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, failure);
    }

    #[test]
    fn display_delegates_to_cause() {
        let err = RowError::Persist(PersistError::new(ElementId::from("p-1"), "disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
