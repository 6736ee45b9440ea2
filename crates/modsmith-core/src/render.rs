//! Statement renderer: records in, literal SQL text out.
//!
//! String literals use double quotes, the convention the game database
//! scripts use; embedded double quotes therefore become single quotes.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::statement::{SqlValue, StatementRecord, TableDef};

const TRUE_TOKENS: &[&str] = &["true", "True", "TRUE"];
const FALSE_TOKENS: &[&str] = &["false", "False", "FALSE"];
const NULL_TOKENS: &[&str] = &["None", "null", "NULL"];

/// Fixed substitutions for typographic apostrophes.
const APOSTROPHE_FIXES: &[(&str, &str)] = &[("\u{2019}", "'"), ("\u{2018}", "'")];

/// Canonical form of a value: boolean tokens become integers, null
/// sentinels become `Null`, text is cleaned of quoting hazards.
pub fn normalize_value(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(text) => {
            if TRUE_TOKENS.contains(&text.as_str()) {
                SqlValue::Integer(1)
            } else if FALSE_TOKENS.contains(&text.as_str()) {
                SqlValue::Integer(0)
            } else if NULL_TOKENS.contains(&text.as_str()) {
                SqlValue::Null
            } else {
                SqlValue::Text(clean_text(text))
            }
        }
        other => other.clone(),
    }
}

fn clean_text(text: &str) -> String {
    let mut cleaned = text.replace('"', "'").replace('@', "");
    for (from, to) in APOSTROPHE_FIXES {
        cleaned = cleaned.replace(from, to);
    }
    cleaned
}

/// Render a single literal.
pub fn render_value(value: &SqlValue) -> String {
    match normalize_value(value) {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(value) => value.to_string(),
        SqlValue::Real(value) => value.to_string(),
        SqlValue::Text(text) => format!("\"{text}\""),
    }
}

/// Render a record to one line of SQL terminated with `;`.
pub fn render_statement(record: &StatementRecord) -> Result<String> {
    match record {
        StatementRecord::Insert {
            table,
            columns,
            values,
        } => render_insert("INSERT INTO", table, columns, values),
        StatementRecord::Replace {
            table,
            columns,
            values,
        } => render_insert("REPLACE INTO", table, columns, values),
        StatementRecord::InsertIgnore {
            table,
            columns,
            values,
        } => render_insert("INSERT OR IGNORE INTO", table, columns, values),
        StatementRecord::Update { table, set, filter } => {
            if set.is_empty() {
                return Err(Error::Render(format!("update of {table} sets no columns")));
            }
            let assignments = set
                .iter()
                .map(|(column, value)| format!("{column} = {}", render_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            let mut sql = format!("UPDATE {table} SET {assignments}");
            if !filter.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&render_filter(filter));
            }
            sql.push(';');
            Ok(sql)
        }
        StatementRecord::Delete { table, filter } => {
            if filter.is_empty() {
                return Err(Error::Render(format!(
                    "delete from {table} has no predicate"
                )));
            }
            Ok(format!("DELETE FROM {table} WHERE {};", render_filter(filter)))
        }
        StatementRecord::CreateTable(def) => render_create_table(def),
        StatementRecord::Raw { sql } => {
            let trimmed = sql.trim().trim_end_matches(';').trim_end();
            if trimmed.is_empty() {
                return Err(Error::Render("empty raw statement".to_string()));
            }
            Ok(format!("{trimmed};"))
        }
    }
}

fn render_insert(
    verb: &str,
    table: &str,
    columns: &[String],
    values: &[SqlValue],
) -> Result<String> {
    if columns.len() != values.len() {
        return Err(Error::Arity {
            table: table.to_string(),
            columns: columns.len(),
            values: values.len(),
        });
    }
    if columns.is_empty() {
        return Err(Error::Render(format!("insert into {table} has no columns")));
    }
    let values = values.iter().map(render_value).collect::<Vec<_>>();
    Ok(format!(
        "{verb} {table} ({}) VALUES ({});",
        columns.join(", "),
        values.join(", ")
    ))
}

fn render_filter(filter: &IndexMap<String, SqlValue>) -> String {
    filter
        .iter()
        .map(|(column, value)| match normalize_value(value) {
            SqlValue::Null => format!("{column} IS NULL"),
            _ => format!("{column} = {}", render_value(value)),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_create_table(def: &TableDef) -> Result<String> {
    if def.columns.is_empty() {
        return Err(Error::Render(format!("table {} has no columns", def.name)));
    }
    let mut parts = Vec::new();
    for column in &def.columns {
        let mut part = format!("{} {}", column.name, column.sql_type);
        if column.not_null {
            part.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            part.push_str(" DEFAULT ");
            part.push_str(&render_value(&SqlValue::Text(default.clone())));
        }
        if column.unique {
            part.push_str(" UNIQUE");
        }
        parts.push(part);
    }
    if !def.primary_key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", def.primary_key.join(", ")));
    }
    for column in &def.columns {
        if let Some(target) = &column.references {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {target} ON DELETE CASCADE ON UPDATE CASCADE",
                column.name
            ));
        }
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        def.name,
        parts.join(", ")
    ))
}
