// ABOUTME: Sync statistics - per-table outcomes and run totals
// ABOUTME: Serialized as the diagnostic payload stored next to the watermark

use serde::{Deserialize, Serialize};

use crate::catalog::SkippedTable;

/// Row counters for one replicated table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub rows_read: u64,
    pub rows_unchanged: u64,
    pub rows_updated: u64,
    /// Source rows with no target row under the same key (never inserted).
    pub rows_missing: u64,
    /// Rows whose lookup or update failed; the loop moved on.
    pub rows_failed: u64,
}

impl TableStats {
    pub fn add(&mut self, other: &TableStats) {
        self.rows_read += other.rows_read;
        self.rows_unchanged += other.rows_unchanged;
        self.rows_updated += other.rows_updated;
        self.rows_missing += other.rows_missing;
        self.rows_failed += other.rows_failed;
    }
}

/// What happened to one source table during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// No table of that name in the target catalog.
    Absent,
    /// The staleness filter found nothing to do.
    UpToDate,
    ColumnMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
    Replicated(TableStats),
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Result of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub watermark: i64,
    pub tables: Vec<TableReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_left: Vec<SkippedEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_right: Vec<SkippedEntry>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub table: String,
    pub reason: String,
}

impl From<&SkippedTable> for SkippedEntry {
    fn from(skipped: &SkippedTable) -> Self {
        Self {
            table: skipped.table.clone(),
            reason: skipped.reason.clone(),
        }
    }
}

impl SyncReport {
    pub fn new(watermark: i64) -> Self {
        Self {
            watermark,
            ..Self::default()
        }
    }

    pub fn push(&mut self, table: &str, outcome: TableOutcome) {
        self.tables.push(TableReport {
            table: table.to_string(),
            outcome,
        });
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }

    /// Row counters summed over every replicated table.
    pub fn totals(&self) -> TableStats {
        let mut totals = TableStats::default();
        for report in &self.tables {
            if let TableOutcome::Replicated(stats) = &report.outcome {
                totals.add(stats);
            }
        }
        totals
    }

    pub fn tables_replicated(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Replicated(_)))
            .count()
    }

    /// True when nothing was skipped or failed along the way.
    ///
    /// Tables absent from the target are expected and do not count.
    pub fn is_clean(&self) -> bool {
        self.skipped_left.is_empty()
            && self.skipped_right.is_empty()
            && self.totals().rows_failed == 0
            && self.tables.iter().all(|t| {
                !matches!(
                    t.outcome,
                    TableOutcome::ColumnMismatch { .. } | TableOutcome::Failed { .. }
                )
            })
    }

    /// Diagnostic payload worth persisting, if any.
    pub fn intel(&self) -> Option<serde_json::Value> {
        if self.is_clean() {
            return None;
        }
        serde_json::to_value(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(updated: u64, failed: u64) -> TableStats {
        TableStats {
            rows_read: 10,
            rows_unchanged: 10 - updated - failed,
            rows_updated: updated,
            rows_missing: 0,
            rows_failed: failed,
        }
    }

    #[test]
    fn test_totals_sum_replicated_tables_only() {
        let mut report = SyncReport::new(0);
        report.push("a", TableOutcome::Replicated(stats(2, 0)));
        report.push("b", TableOutcome::Replicated(stats(3, 1)));
        report.push("c", TableOutcome::UpToDate);

        let totals = report.totals();
        assert_eq!(totals.rows_read, 20);
        assert_eq!(totals.rows_updated, 5);
        assert_eq!(totals.rows_failed, 1);
        assert_eq!(report.tables_replicated(), 2);
    }

    #[test]
    fn test_clean_report_has_no_intel() {
        let mut report = SyncReport::new(0);
        report.push("a", TableOutcome::Replicated(stats(2, 0)));
        report.push("logs", TableOutcome::Absent);
        assert!(report.is_clean());
        assert!(report.intel().is_none());
    }

    #[test]
    fn test_failures_produce_intel() {
        let mut report = SyncReport::new(0);
        report.push(
            "a",
            TableOutcome::Failed {
                error: "boom".to_string(),
            },
        );
        assert!(!report.is_clean());
        let intel = report.intel().unwrap();
        assert_eq!(intel["tables"][0]["table"], "a");
        assert_eq!(intel["tables"][0]["status"], "failed");
        assert_eq!(intel["tables"][0]["error"], "boom");
    }

    #[test]
    fn test_failed_rows_produce_intel() {
        let mut report = SyncReport::new(0);
        report.push("a", TableOutcome::Replicated(stats(2, 1)));
        assert!(report.intel().is_some());
    }

    #[test]
    fn test_replicated_outcome_serializes_flat() {
        let mut report = SyncReport::new(42);
        report.push("users", TableOutcome::Replicated(stats(1, 0)));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["watermark"], 42);
        assert_eq!(json["tables"][0]["status"], "replicated");
        assert_eq!(json["tables"][0]["rows_updated"], 1);
        assert!(json.get("skipped_left").is_none());
    }
}
