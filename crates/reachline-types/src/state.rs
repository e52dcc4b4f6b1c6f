//! Run tracking model types.
//!
//! Shared by the progress store and the engine so both can speak the same
//! run lifecycle without a circular dependency.

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, ItemStatus};

/// Terminal status of an engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// Interrupted by the operator; the run drained and remains resumable.
    Stopped,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate item counts for a run.
///
/// Invariant: `pending + processing + completed + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl RunStats {
    /// True when the counts satisfy the conservation invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.pending + self.processing + self.completed + self.failed == self.total
    }

    /// True when every item has reached a terminal status.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// One per-item failure recorded against a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub item_id: ItemId,
    pub message: String,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
}

/// Append-only audit record of one item's outcome within a run.
///
/// Never consulted by resume computation; the authoritative per-item state
/// is the item's global status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    pub status: ItemStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Summary row for a historical run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub status: RunStatus,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_roundtrip() {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Stopped,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn run_stats_consistency() {
        let stats = RunStats { pending: 2, processing: 1, completed: 5, failed: 2, total: 10 };
        assert!(stats.is_consistent());
        assert!(!stats.is_settled());

        let settled = RunStats { pending: 0, processing: 0, completed: 8, failed: 2, total: 10 };
        assert!(settled.is_consistent());
        assert!(settled.is_settled());

        let broken = RunStats { pending: 1, processing: 0, completed: 1, failed: 0, total: 10 };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn default_stats_are_consistent() {
        assert!(RunStats::default().is_consistent());
        assert!(RunStats::default().is_settled());
    }

    #[test]
    fn item_outcome_serde_roundtrip() {
        let outcome = ItemOutcome {
            item_id: ItemId::new("d1"),
            status: ItemStatus::Completed,
            duration_ms: 412,
            details: Some(serde_json::json!({"candidates": 3})),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: ItemOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }
}
