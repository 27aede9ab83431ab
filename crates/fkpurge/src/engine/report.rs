//! Plans and reports produced by the purge engine.

use crate::domain::TableName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the filtered target sits relative to its dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetOrder {
    /// Dependents deepest-first, then the target. No row is removed while a
    /// surviving row still references it.
    #[default]
    Last,

    /// Target first, then dependents deepest-first. Needs the store to defer
    /// foreign-key checks to commit.
    First,
}

/// Why a table is part of a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// The requested table; only rows matching the filter are removed
    Target,

    /// A transitive dependent; every row is removed
    Dependent,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Target => write!(f, "target"),
            StepKind::Dependent => write!(f, "dependent"),
        }
    }
}

/// One table of a purge, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeStep {
    /// The table to delete from
    pub table: TableName,

    /// Target or dependent
    pub kind: StepKind,
}

/// The ordered steps a purge of `target` would take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgePlan {
    /// The requested table
    pub target: TableName,

    /// Whether the target was found in the dependency graph. When it was not,
    /// the plan holds only the target step.
    pub found: bool,

    /// Steps in execution order
    pub steps: Vec<PurgeStep>,
}

impl PurgePlan {
    /// Tables of every dependent step, in execution order.
    pub fn dependents(&self) -> impl Iterator<Item = &TableName> {
        self.steps
            .iter()
            .filter(|step| step.kind == StepKind::Dependent)
            .map(|step| &step.table)
    }
}

/// Result of deleting from one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The table has no row source; nothing was attempted
    NotFound,

    /// This many rows were removed (zero when nothing matched)
    Deleted(u64),
}

impl DeleteOutcome {
    /// Rows removed, zero for [`DeleteOutcome::NotFound`].
    pub fn rows(&self) -> u64 {
        match self {
            DeleteOutcome::NotFound => 0,
            DeleteOutcome::Deleted(rows) => *rows,
        }
    }
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::NotFound => write!(f, "no row source"),
            DeleteOutcome::Deleted(0) => write!(f, "none found"),
            DeleteOutcome::Deleted(rows) => write!(f, "{rows} deleted"),
        }
    }
}

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// The table
    pub table: TableName,

    /// Target or dependent
    pub kind: StepKind,

    /// Rows removed (or, for a preview, rows that would be removed)
    pub outcome: DeleteOutcome,
}

/// Outcome of a committed purge or of a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// The requested table
    pub target: TableName,

    /// Per-table results in execution order
    pub steps: Vec<StepReport>,
}

impl PurgeReport {
    /// Sum of rows over every step.
    pub fn total_deleted(&self) -> u64 {
        self.steps.iter().map(|step| step.outcome.rows()).sum()
    }

    /// The result for `table`, if it was part of the purge.
    pub fn outcome_for(&self, table: &str) -> Option<DeleteOutcome> {
        self.steps
            .iter()
            .find(|step| step.table.as_str().eq_ignore_ascii_case(table))
            .map(|step| step.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_deleted_ignores_not_found() {
        let report = PurgeReport {
            target: TableName::new("a"),
            steps: vec![
                StepReport {
                    table: TableName::new("c"),
                    kind: StepKind::Dependent,
                    outcome: DeleteOutcome::Deleted(3),
                },
                StepReport {
                    table: TableName::new("b"),
                    kind: StepKind::Dependent,
                    outcome: DeleteOutcome::NotFound,
                },
                StepReport {
                    table: TableName::new("a"),
                    kind: StepKind::Target,
                    outcome: DeleteOutcome::Deleted(1),
                },
            ],
        };

        assert_eq!(report.total_deleted(), 4);
        assert_eq!(report.outcome_for("B"), Some(DeleteOutcome::NotFound));
        assert_eq!(report.outcome_for("z"), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(DeleteOutcome::Deleted(2)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "deleted", "rows": 2}));

        let json = serde_json::to_value(DeleteOutcome::NotFound).unwrap();
        assert_eq!(json, serde_json::json!({"status": "not_found"}));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(DeleteOutcome::Deleted(0).to_string(), "none found");
        assert_eq!(DeleteOutcome::Deleted(5).to_string(), "5 deleted");
    }
}
