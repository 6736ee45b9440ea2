use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Literal value carried by a statement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    /// Plain textual form used for comparisons and provenance messages.
    pub fn display(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(value) => value.to_string(),
            SqlValue::Real(value) => value.to_string(),
            SqlValue::Text(value) => value.clone(),
        }
    }
}

/// Column definition inside a table-definition section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<String>,
    pub references: Option<String>,
}

/// Table created by a table-definition section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

/// Discriminant of a [`StatementRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Insert,
    Replace,
    InsertIgnore,
    Update,
    Delete,
    CreateTable,
    Raw,
}

/// Abstract statement emitted by the compiler, rendered later into SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementRecord {
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    },
    Replace {
        table: String,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    },
    InsertIgnore {
        table: String,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    },
    Update {
        table: String,
        set: IndexMap<String, SqlValue>,
        filter: IndexMap<String, SqlValue>,
    },
    Delete {
        table: String,
        filter: IndexMap<String, SqlValue>,
    },
    CreateTable(TableDef),
    Raw {
        sql: String,
    },
}

impl StatementRecord {
    /// Build an insert-family record from ordered column/value pairs.
    pub fn from_pairs(
        kind: StatementKind,
        table: impl Into<String>,
        pairs: impl IntoIterator<Item = (String, SqlValue)>,
    ) -> Result<Self> {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = pairs.into_iter().unzip();
        Self::insert_family(kind, table.into(), columns, values)
    }

    /// Build an insert-family record, rejecting mismatched arity.
    pub fn insert_family(
        kind: StatementKind,
        table: String,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    ) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(Error::Arity {
                table,
                columns: columns.len(),
                values: values.len(),
            });
        }
        match kind {
            StatementKind::Insert => Ok(StatementRecord::Insert {
                table,
                columns,
                values,
            }),
            StatementKind::Replace => Ok(StatementRecord::Replace {
                table,
                columns,
                values,
            }),
            StatementKind::InsertIgnore => Ok(StatementRecord::InsertIgnore {
                table,
                columns,
                values,
            }),
            other => Err(Error::Render(format!(
                "{other:?} is not an insert-family statement"
            ))),
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            StatementRecord::Insert { .. } => StatementKind::Insert,
            StatementRecord::Replace { .. } => StatementKind::Replace,
            StatementRecord::InsertIgnore { .. } => StatementKind::InsertIgnore,
            StatementRecord::Update { .. } => StatementKind::Update,
            StatementRecord::Delete { .. } => StatementKind::Delete,
            StatementRecord::CreateTable(_) => StatementKind::CreateTable,
            StatementRecord::Raw { .. } => StatementKind::Raw,
        }
    }

    /// Target table, when the record names one.
    pub fn table(&self) -> Option<&str> {
        match self {
            StatementRecord::Insert { table, .. }
            | StatementRecord::Replace { table, .. }
            | StatementRecord::InsertIgnore { table, .. }
            | StatementRecord::Update { table, .. }
            | StatementRecord::Delete { table, .. } => Some(table),
            StatementRecord::CreateTable(def) => Some(&def.name),
            StatementRecord::Raw { .. } => None,
        }
    }

    /// Column/value pairs of an insert-family record.
    pub fn pairs(&self) -> Option<Vec<(&str, &SqlValue)>> {
        match self {
            StatementRecord::Insert {
                columns, values, ..
            }
            | StatementRecord::Replace {
                columns, values, ..
            }
            | StatementRecord::InsertIgnore {
                columns, values, ..
            } => Some(
                columns
                    .iter()
                    .map(String::as_str)
                    .zip(values.iter())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Value of `column` in an insert-family record (case-insensitive).
    pub fn value_of(&self, column: &str) -> Option<&SqlValue> {
        self.pairs()?
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }
}

/// Rendered statement tagged with its provenance, as consumed by the
/// validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedStatement {
    /// Source file the statement was compiled from.
    pub source: String,
    /// 1-based line: the script line for SQL files, the rendered line for XML.
    pub line: usize,
    pub sql: String,
    pub record: Option<StatementRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_family_rejects_mismatched_arity() {
        let err = StatementRecord::insert_family(
            StatementKind::Insert,
            "Types".to_string(),
            vec!["Type".to_string(), "Kind".to_string()],
            vec![SqlValue::text("A")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Arity { columns: 2, values: 1, .. }));
    }

    #[test]
    fn value_of_is_case_insensitive() {
        let record = StatementRecord::from_pairs(
            StatementKind::Replace,
            "Types",
            vec![
                ("Type".to_string(), SqlValue::text("A")),
                ("Kind".to_string(), SqlValue::text("KIND_X")),
            ],
        )
        .unwrap();
        assert_eq!(record.kind(), StatementKind::Replace);
        assert_eq!(record.value_of("kind"), Some(&SqlValue::text("KIND_X")));
        assert_eq!(record.table(), Some("Types"));
    }
}
