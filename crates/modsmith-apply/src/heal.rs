//! Pure rewrite rules applied to failing statements before they are
//! reported. Each rule runs at most once per statement.

use modsmith_core::SqlValue;

use crate::sqlparse::{Literal, ParsedInsert, Verb};

/// Equality predicate locating the row a uniqueness failure collided with:
/// the statement's values for the violated columns, minus the metadata
/// column. `None` when the statement does not supply every such column.
pub fn conflict_predicate(
    unique_columns: &[String],
    pairs: &[(String, SqlValue)],
    metadata_column: &str,
) -> Option<Vec<(String, SqlValue)>> {
    let mut predicate = Vec::new();
    for column in unique_columns {
        if column.eq_ignore_ascii_case(metadata_column) {
            continue;
        }
        let (name, value) = pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))?;
        predicate.push((name.clone(), value.clone()));
    }
    if predicate.is_empty() {
        None
    } else {
        Some(predicate)
    }
}

/// Compare one statement value with the stored value read back as text.
/// Numbers compare numerically so `1`, `1.0` and `'1'` agree.
pub fn values_equal(statement: &SqlValue, stored: Option<&str>) -> bool {
    match (statement, stored) {
        (SqlValue::Null, None) => true,
        (SqlValue::Null, Some(_)) | (_, None) => false,
        (value, Some(stored)) => {
            let text = value.display();
            if text == stored {
                return true;
            }
            match (text.trim().parse::<f64>(), stored.trim().parse::<f64>()) {
                (Ok(left), Ok(right)) => left == right,
                _ => false,
            }
        }
    }
}

/// True when every statement column except the metadata column already
/// holds the same value in the stored row.
pub fn rows_identical(
    pairs: &[(String, SqlValue)],
    stored: &[Option<String>],
    metadata_column: &str,
) -> bool {
    compared_pairs(pairs, metadata_column)
        .zip(stored.iter())
        .all(|((_, value), stored)| values_equal(value, stored.as_deref()))
}

/// Statement columns taking part in the duplicate comparison.
pub fn compared_pairs<'a>(
    pairs: &'a [(String, SqlValue)],
    metadata_column: &'a str,
) -> impl Iterator<Item = &'a (String, SqlValue)> + 'a {
    pairs
        .iter()
        .filter(move |(name, _)| !name.eq_ignore_ascii_case(metadata_column))
}

/// Upsert form of a failed insert.
pub fn to_replace(insert: &ParsedInsert) -> ParsedInsert {
    insert.with_verb(Verb::Replace)
}

/// Add `column = next` to every row. `None` when the statement has no
/// column list or already names the column.
pub fn splice_column(insert: &ParsedInsert, column: &str, next: i64) -> Option<ParsedInsert> {
    let columns = insert.columns.as_ref()?;
    if insert.has_column(column) {
        return None;
    }
    let mut spliced = insert.clone();
    let mut columns = columns.clone();
    columns.push(column.to_string());
    spliced.columns = Some(columns);
    for (offset, row) in spliced.rows.iter_mut().enumerate() {
        let offset = i64::try_from(offset).unwrap_or(0);
        row.push(Literal::integer(next + offset));
    }
    Some(spliced)
}

/// Required columns the statement leaves out, in table order.
pub fn missing_required_columns(required: &[String], provided: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|column| {
            !provided
                .iter()
                .any(|name| name.eq_ignore_ascii_case(column))
        })
        .cloned()
        .collect()
}
