//! Failure classification from engine error messages.

use serde::{Deserialize, Serialize};

/// What the engine reported, parsed from its message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Uniqueness violation. `table` is `None` for index-named failures.
    Unique {
        table: Option<String>,
        columns: Vec<String>,
    },
    NotNull {
        table: String,
        column: String,
    },
    ForeignKey,
    MissingTable(String),
    MissingColumn(String),
    ColumnValue,
    Syntax,
    Other,
}

impl FailureKind {
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if let Some(rest) = after_marker(message, "UNIQUE constraint failed:") {
            let mut table = None;
            let mut columns = Vec::new();
            for part in rest.split(',') {
                match part.trim().split_once('.') {
                    Some((owner, column)) => {
                        table.get_or_insert_with(|| owner.to_string());
                        columns.push(column.to_string());
                    }
                    None => {
                        return FailureKind::Unique {
                            table: None,
                            columns: Vec::new(),
                        };
                    }
                }
            }
            return FailureKind::Unique { table, columns };
        }
        if let Some(rest) = after_marker(message, "NOT NULL constraint failed:") {
            if let Some((table, column)) = rest.trim().split_once('.') {
                return FailureKind::NotNull {
                    table: table.to_string(),
                    column: column.to_string(),
                };
            }
        }
        if lower.contains("foreign key constraint failed") {
            return FailureKind::ForeignKey;
        }
        if let Some(rest) = after_marker(&lower, "no such table:") {
            let start = message.len() - rest.len();
            return FailureKind::MissingTable(message[start..].trim().to_string());
        }
        if let Some(pos) = lower.find("has no column named") {
            let start = pos + "has no column named".len();
            return FailureKind::MissingColumn(message[start..].trim().to_string());
        }
        if let Some(rest) = after_marker(&lower, "no such column:") {
            let start = message.len() - rest.len();
            return FailureKind::MissingColumn(message[start..].trim().to_string());
        }
        if lower.contains("values for")
            || lower.contains("values were supplied")
            || lower.contains("same number of terms")
            || lower.contains("datatype mismatch")
        {
            return FailureKind::ColumnValue;
        }
        if lower.contains("syntax error")
            || lower.contains("incomplete input")
            || lower.contains("unrecognized token")
        {
            return FailureKind::Syntax;
        }
        FailureKind::Other
    }
}

fn after_marker<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    message
        .find(marker)
        .map(|pos| &message[pos + marker.len()..])
}

/// Report bucket for a failure that was not healed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Syntax,
    MissingTable,
    BrokenInsert,
    CommentArtifact,
    Unresolved,
}

impl ErrorClass {
    pub fn label(self) -> &'static str {
        match self {
            ErrorClass::Syntax => "syntax",
            ErrorClass::MissingTable => "missing-table",
            ErrorClass::BrokenInsert => "broken-insert",
            ErrorClass::CommentArtifact => "comment-artifact",
            ErrorClass::Unresolved => "unresolved",
        }
    }
}

/// Bucket a failure. Syntax errors on text that carries comment markers are
/// leftovers from commented-out content rather than broken SQL.
pub fn classify(failure: &FailureKind, sql: &str) -> ErrorClass {
    match failure {
        FailureKind::Syntax if looks_like_comment(sql) => ErrorClass::CommentArtifact,
        FailureKind::Syntax => ErrorClass::Syntax,
        FailureKind::MissingTable(_) => ErrorClass::MissingTable,
        FailureKind::MissingColumn(_) | FailureKind::ColumnValue | FailureKind::NotNull { .. } => {
            ErrorClass::BrokenInsert
        }
        FailureKind::Unique { .. } | FailureKind::ForeignKey | FailureKind::Other => {
            ErrorClass::Unresolved
        }
    }
}

fn looks_like_comment(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    trimmed.starts_with("--")
        || trimmed.starts_with("/*")
        || trimmed.starts_with("*/")
        || sql.contains("<!--")
        || sql.contains("-->")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unique_columns() {
        assert_eq!(
            FailureKind::from_message("UNIQUE constraint failed: UnitUpgrades.Unit, UnitUpgrades.UpgradeUnit"),
            FailureKind::Unique {
                table: Some("UnitUpgrades".to_string()),
                columns: vec!["Unit".to_string(), "UpgradeUnit".to_string()],
            }
        );
        assert_eq!(
            FailureKind::from_message("UNIQUE constraint failed: index 'ix_units'"),
            FailureKind::Unique {
                table: None,
                columns: Vec::new(),
            }
        );
    }

    #[test]
    fn parses_engine_messages() {
        assert_eq!(
            FailureKind::from_message("NOT NULL constraint failed: ModifierArguments.Value"),
            FailureKind::NotNull {
                table: "ModifierArguments".to_string(),
                column: "Value".to_string(),
            }
        );
        assert_eq!(
            FailureKind::from_message("no such table: UnitsXP2"),
            FailureKind::MissingTable("UnitsXP2".to_string())
        );
        assert_eq!(
            FailureKind::from_message("table Units has no column named Strength"),
            FailureKind::MissingColumn("Strength".to_string())
        );
        assert_eq!(
            FailureKind::from_message("3 values for 2 columns"),
            FailureKind::ColumnValue
        );
        assert_eq!(
            FailureKind::from_message("FOREIGN KEY constraint failed"),
            FailureKind::ForeignKey
        );
        assert_eq!(
            FailureKind::from_message("near \"VALUE\": syntax error"),
            FailureKind::Syntax
        );
        assert_eq!(FailureKind::from_message("disk I/O error"), FailureKind::Other);
    }

    #[test]
    fn classifies_comment_leftovers() {
        assert_eq!(
            classify(&FailureKind::Syntax, "<!-- INSERT INTO Types VALUES ('A')"),
            ErrorClass::CommentArtifact
        );
        assert_eq!(
            classify(&FailureKind::Syntax, "INSERT INTO Types VALUES ('A'"),
            ErrorClass::Syntax
        );
        assert_eq!(
            classify(&FailureKind::MissingTable("X".to_string()), "INSERT INTO X VALUES (1)"),
            ErrorClass::MissingTable
        );
        assert_eq!(
            classify(&FailureKind::ColumnValue, "INSERT INTO X VALUES (1)"),
            ErrorClass::BrokenInsert
        );
        assert_eq!(classify(&FailureKind::Other, ""), ErrorClass::Unresolved);
    }
}
