use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::schema::SchemaSnapshot;

/// Validate internal consistency of a schema snapshot before it is cached.
///
/// This checks:
/// - duplicate database names and duplicate columns
/// - map keys agree with table names
/// - primary key and foreign key columns exist
/// - referenced tables exist in the same database
/// - backlinks name existing tables
pub fn validate_snapshot(snapshot: &SchemaSnapshot) -> Result<()> {
    let mut databases = BTreeSet::new();

    for database in &snapshot.databases {
        if !databases.insert(database.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate database name: {}",
                database.name
            )));
        }

        for (key, table) in &database.tables {
            if key != &table.name {
                return Err(Error::InvalidSchema(format!(
                    "table keyed as {key} is named {}",
                    table.name
                )));
            }

            let mut columns = BTreeSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate column name: {}.{}.{}",
                        database.name, table.name, column.name
                    )));
                }
            }

            for column in &table.primary_key {
                if !columns.contains(column.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "primary key column not found: {}.{}.{}",
                        database.name, table.name, column
                    )));
                }
            }

            for (column, target) in table
                .foreign_keys
                .iter()
                .chain(table.extra_foreign_keys.iter())
            {
                if !columns.contains(column.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "foreign key column not found: {}.{}.{}",
                        database.name, table.name, column
                    )));
                }

                let referenced = database.tables.get(&target.table).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "referenced table not found: {}.{}",
                        database.name, target.table
                    ))
                })?;

                if !referenced.has_column(&target.column) {
                    return Err(Error::InvalidSchema(format!(
                        "referenced column not found: {}.{}.{}",
                        database.name, target.table, target.column
                    )));
                }
            }

            for backlink in &table.backlinks {
                if !database.tables.contains_key(backlink) {
                    return Err(Error::InvalidSchema(format!(
                        "backlink names unknown table: {}.{} <- {}",
                        database.name, table.name, backlink
                    )));
                }
            }
        }
    }

    Ok(())
}
