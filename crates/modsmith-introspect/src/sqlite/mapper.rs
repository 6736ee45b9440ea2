use std::collections::BTreeMap;

use modsmith_core::{ColumnRef, ColumnSpec, TableSpec};

use super::queries::{RawColumn, RawForeignKey};

/// Build a table from catalog columns: key order, and the primary/secondary
/// partition (primary = not null without a default).
pub fn map_table(name: String, mut raw: Vec<RawColumn>) -> TableSpec {
    raw.sort_by_key(|column| column.cid);

    let mut keyed: Vec<(i64, String)> = raw
        .iter()
        .filter(|column| column.pk > 0)
        .map(|column| (column.pk, column.name.clone()))
        .collect();
    keyed.sort();
    let primary_key = keyed.into_iter().map(|(_, name)| name).collect();

    let mut primary_columns = Vec::new();
    let mut secondary_columns = Vec::new();
    let columns = raw
        .into_iter()
        .map(|column| {
            if column.not_null && column.default.is_none() {
                primary_columns.push(column.name.clone());
            } else {
                secondary_columns.push(column.name.clone());
            }
            ColumnSpec {
                name: column.name,
                declared_type: column.declared_type,
                not_null: column.not_null,
                default: column.default,
                pk_ordinal: u32::try_from(column.pk).unwrap_or(0),
            }
        })
        .collect();

    TableSpec {
        name,
        columns,
        primary_key,
        primary_columns,
        secondary_columns,
        ..TableSpec::default()
    }
}

/// Attach declared foreign keys. A constraint that omits the parent column
/// refers to the parent's primary key at the same position.
pub fn map_foreign_keys(
    tables: &mut BTreeMap<String, TableSpec>,
    raw: BTreeMap<String, Vec<RawForeignKey>>,
) {
    let parent_keys: BTreeMap<String, Vec<String>> = tables
        .iter()
        .map(|(name, table)| (name.clone(), table.primary_key.clone()))
        .collect();

    for (table_name, foreign_keys) in raw {
        let Some(table) = tables.get_mut(&table_name) else {
            continue;
        };
        for fk in foreign_keys {
            let column = match fk.to {
                Some(column) => column,
                None => {
                    let position = usize::try_from(fk.seq).unwrap_or(0);
                    match parent_keys
                        .get(&fk.table)
                        .and_then(|key| key.get(position))
                    {
                        Some(column) => column.clone(),
                        None => {
                            tracing::debug!(
                                event = "fk_target_unresolved",
                                table = %table_name,
                                column = %fk.from,
                                parent = %fk.table,
                                constraint = fk.id
                            );
                            continue;
                        }
                    }
                }
            };
            table.foreign_keys.insert(
                fk.from,
                ColumnRef {
                    table: fk.table,
                    column,
                },
            );
        }
    }
}
