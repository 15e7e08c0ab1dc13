//! Per-cycle reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabsync_engine::{AbortReason, ChangeCounts, RecordId, Side, SuppressedDelete, TieBreak};
use uuid::Uuid;

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CycleOutcome {
    /// The change set was applied (individual operations may have failed)
    Completed,
    /// A fetch failed; nothing was written
    Aborted { reason: AbortReason },
    /// Shutdown arrived before any write
    Abandoned,
    /// The engine rejected its input; nothing was written
    Failed { error: String },
}

/// An operation the target store rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOperation {
    pub target: Side,
    pub record_id: RecordId,
    pub kind: &'static str,
    pub error: String,
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub id: Uuid,
    /// Sequence number since startup
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    /// Snapshot sizes, when both fetches succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched: Option<FetchedCounts>,
    /// Operations the stores accepted
    pub applied: ChangeCounts,
    pub failed: Vec<FailedOperation>,
    pub suppressed: Vec<SuppressedDelete>,
    pub tie_breaks: Vec<TieBreak>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchedCounts {
    pub a: usize,
    pub b: usize,
}

impl CycleSummary {
    pub(crate) fn start(cycle: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cycle,
            started_at: now,
            finished_at: now,
            outcome: CycleOutcome::Completed,
            fetched: None,
            applied: ChangeCounts::default(),
            failed: Vec::new(),
            suppressed: Vec::new(),
            tie_breaks: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self, outcome: CycleOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }

    /// Whether the cycle ran to completion with every operation accepted.
    pub fn is_clean(&self) -> bool {
        self.outcome == CycleOutcome::Completed && self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_serialization() {
        let aborted = CycleOutcome::Aborted {
            reason: AbortReason::PartialFetchFailure { failed: Side::B },
        };
        assert_eq!(
            serde_json::to_value(&aborted).unwrap(),
            json!({
                "status": "aborted",
                "reason": { "kind": "partialFetchFailure", "failed": "b" }
            })
        );
        assert_eq!(
            serde_json::to_value(CycleOutcome::Completed).unwrap(),
            json!({ "status": "completed" })
        );
    }

    #[test]
    fn summary_lifecycle() {
        let summary = CycleSummary::start(3);
        assert_eq!(summary.cycle, 3);

        let summary = summary.finish(CycleOutcome::Abandoned);
        assert!(!summary.is_clean());
        assert!(summary.finished_at >= summary.started_at);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["outcome"]["status"], "abandoned");
        assert!(value.get("fetched").is_none());
        assert_eq!(value["applied"]["a"]["inserted"], 0);
    }
}
