//! Run result types consumed by the CLI.

use reachline_types::state::{RunError, RunStats, RunStatus};

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub status: RunStatus,
    /// Final counts across the whole item population.
    pub stats: RunStats,
    /// Items actually processed by this run (the resume set).
    pub processed: u64,
    pub batches: usize,
    pub duration_secs: f64,
    /// Per-item failures recorded during this run.
    pub errors: Vec<RunError>,
}

impl RunReport {
    /// True when every item in the population reached a terminal status.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.stats.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_report() {
        let report = RunReport {
            run_id: 1,
            status: RunStatus::Completed,
            stats: RunStats { pending: 0, processing: 0, completed: 9, failed: 1, total: 10 },
            processed: 10,
            batches: 2,
            duration_secs: 12.5,
            errors: vec![],
        };
        assert!(report.is_settled());
        assert!(report.stats.is_consistent());
    }
}
