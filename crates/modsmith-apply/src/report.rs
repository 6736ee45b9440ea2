use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::ErrorClass;

/// One unresolved statement failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub source: String,
    pub line: usize,
    pub sql: String,
    pub diagnostic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    DuplicateSkipped,
    RewrittenToReplace,
    OrderingSpliced,
}

/// A failure the validator repaired (or proved harmless).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealedEntry {
    pub source: String,
    pub line: usize,
    pub table: String,
    pub action: HealAction,
    pub sql: String,
}

/// Statement that likely produced a foreign-key violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkViolation {
    pub batch: String,
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
    pub constraint: i64,
    pub columns: Vec<String>,
    pub values: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<Provenance>,
}

impl FkViolation {
    pub fn describe(&self) -> String {
        let pairs = self
            .columns
            .iter()
            .zip(self.values.iter().map(|value| value.as_deref().unwrap_or("NULL")))
            .map(|(column, value)| format!("{column}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        let row = self
            .rowid
            .map(|rowid| format!("row {rowid}"))
            .unwrap_or_else(|| "row ?".to_string());
        let mut line = format!(
            "{} {} ({pairs}) has no parent in {} [constraint {}]",
            self.table, row, self.parent, self.constraint
        );
        if !self.provenance.is_empty() {
            let sources = self
                .provenance
                .iter()
                .map(|origin| format!("{}:{}", origin.source, origin.line))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(&format!(" likely from {sources}"));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub name: String,
    pub statements: usize,
    pub executed: usize,
    pub healed: usize,
    pub failed: usize,
    pub fk_violations: usize,
    pub outcome: BatchOutcome,
}

/// Everything a validation run found, grouped by error class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub entries: BTreeMap<ErrorClass, Vec<ReportEntry>>,
    pub healed: Vec<HealedEntry>,
    pub fk_violations: Vec<FkViolation>,
    pub batches: Vec<BatchSummary>,
}

impl ValidationReport {
    pub fn record(&mut self, class: ErrorClass, entry: ReportEntry) {
        self.entries.entry(class).or_default().push(entry);
    }

    pub fn count(&self, class: ErrorClass) -> usize {
        self.entries.get(&class).map_or(0, Vec::len)
    }

    pub fn failure_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn fk_violation_count(&self) -> usize {
        self.fk_violations.len()
    }

    /// No unresolved failures, no violations, every batch committed.
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
            && self.fk_violations.is_empty()
            && self
                .batches
                .iter()
                .all(|batch| batch.outcome == BatchOutcome::Committed)
    }

    /// Human-readable lines grouped by class.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for batch in &self.batches {
            let outcome = match batch.outcome {
                BatchOutcome::Committed => "committed",
                BatchOutcome::RolledBack => "rolled back",
            };
            lines.push(format!(
                "batch {}: {} statement(s), {} executed, {} healed, {} failed, {} fk violation(s), {outcome}",
                batch.name,
                batch.statements,
                batch.executed,
                batch.healed,
                batch.failed,
                batch.fk_violations
            ));
        }
        for (class, entries) in &self.entries {
            lines.push(format!("[{}] {} failure(s)", class.label(), entries.len()));
            for entry in entries {
                lines.push(format!(
                    "  {}:{}: {} | {}",
                    entry.source, entry.line, entry.diagnostic, entry.sql
                ));
            }
        }
        if !self.fk_violations.is_empty() {
            lines.push(format!(
                "[foreign-key] {} violation(s)",
                self.fk_violations.len()
            ));
            for violation in &self.fk_violations {
                lines.push(format!("  {}", violation.describe()));
            }
        }
        if !self.healed.is_empty() {
            lines.push(format!("[healed] {} statement(s)", self.healed.len()));
            for healed in &self.healed {
                let action = match healed.action {
                    HealAction::DuplicateSkipped => "duplicate skipped",
                    HealAction::RewrittenToReplace => "rewritten to replace",
                    HealAction::OrderingSpliced => "ordering column spliced",
                };
                lines.push(format!(
                    "  {}:{}: {} ({action})",
                    healed.source, healed.line, healed.table
                ));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_grouped_lines() {
        let mut report = ValidationReport::default();
        report.record(
            ErrorClass::MissingTable,
            ReportEntry {
                source: "mod/effects.xml".to_string(),
                line: 3,
                sql: "INSERT INTO Nope (A) VALUES (1);".to_string(),
                diagnostic: "no such table: Nope".to_string(),
            },
        );
        report.fk_violations.push(FkViolation {
            batch: "mods".to_string(),
            table: "Units".to_string(),
            rowid: Some(4),
            parent: "Types".to_string(),
            constraint: 0,
            columns: vec!["UnitType".to_string()],
            values: vec![Some("UNIT_Z".to_string())],
            provenance: vec![Provenance {
                source: "mod/units.sql".to_string(),
                line: 2,
            }],
        });

        let lines = report.render_lines();
        assert_eq!(lines[0], "[missing-table] 1 failure(s)");
        assert_eq!(
            lines[1],
            "  mod/effects.xml:3: no such table: Nope | INSERT INTO Nope (A) VALUES (1);"
        );
        assert_eq!(
            lines[3],
            "  Units row 4 (UnitType=UNIT_Z) has no parent in Types [constraint 0] likely from mod/units.sql:2"
        );
        assert!(!report.is_clean());
        assert_eq!(report.count(ErrorClass::MissingTable), 1);
    }

    #[test]
    fn report_serializes_class_keys() {
        let mut report = ValidationReport::default();
        report.record(
            ErrorClass::CommentArtifact,
            ReportEntry {
                source: "a.sql".to_string(),
                line: 1,
                sql: "-->".to_string(),
                diagnostic: "syntax error".to_string(),
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"]["comment_artifact"][0]["line"], 1);
    }
}
