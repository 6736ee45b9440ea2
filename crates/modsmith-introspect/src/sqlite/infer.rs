//! Relationships the catalog does not declare: foreign keys inferred from
//! value containment, and boolean columns mined from observed values.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::SqlitePool;

use modsmith_core::{ColumnRef, Result, TableSpec};

use super::queries;
use crate::options::ProbeOptions;

/// Containment and cardinality test for one candidate column.
///
/// Every value must appear among the key values, there must be at least one
/// value, and the column may not have more distinct values than the key.
pub fn is_contained(values: &[String], keys: &BTreeSet<String>) -> bool {
    !values.is_empty() && values.len() <= keys.len() && values.iter().all(|value| keys.contains(value))
}

/// Pick among several containing tables: keep only those whose own key is
/// not a foreign key. A single survivor wins.
pub fn prefer_end_of_chain(candidates: &[String], tables: &BTreeMap<String, TableSpec>) -> Option<String> {
    let ends: Vec<&String> = candidates
        .iter()
        .filter(|name| {
            tables
                .get(name.as_str())
                .and_then(|table| table.single_pk().map(|pk| table.reference(pk).is_none()))
                .unwrap_or(false)
        })
        .collect();
    match ends.as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

/// Add inferred foreign keys to `tables`.
pub async fn infer_foreign_keys(
    pool: &SqlitePool,
    tables: &mut BTreeMap<String, TableSpec>,
    opts: &ProbeOptions,
) -> Result<usize> {
    let mut key_values: BTreeMap<String, (String, BTreeSet<String>)> = BTreeMap::new();
    for (name, table) in tables.iter() {
        if name == &opts.catch_all_table {
            continue;
        }
        let Some(pk) = table.single_pk() else {
            continue;
        };
        let values = queries::distinct_key_values(pool, name, pk).await?;
        key_values.insert(name.clone(), (pk.to_string(), values.into_iter().collect()));
    }

    let mut resolved: Vec<(String, String, ColumnRef)> = Vec::new();
    let mut deferred: Vec<(String, String, Vec<String>)> = Vec::new();

    for (name, table) in tables.iter() {
        let declared_targets: BTreeSet<&str> = table
            .foreign_keys
            .values()
            .map(|target| target.table.as_str())
            .collect();

        for column in &table.columns {
            if table.primary_key.contains(&column.name)
                || table.foreign_keys.contains_key(&column.name)
            {
                continue;
            }
            let values = queries::distinct_text_values(pool, name, &column.name).await?;
            if values.is_empty() {
                continue;
            }

            let matches: Vec<String> = key_values
                .iter()
                .filter(|(target, _)| *target != name && !declared_targets.contains(target.as_str()))
                .filter(|(_, (_, keys))| is_contained(&values, keys))
                .map(|(target, _)| target.clone())
                .collect();

            match matches.as_slice() {
                [] => {}
                [target] => {
                    let key = key_values[target].0.clone();
                    resolved.push((
                        name.clone(),
                        column.name.clone(),
                        ColumnRef {
                            table: target.clone(),
                            column: key,
                        },
                    ));
                }
                _ => deferred.push((name.clone(), column.name.clone(), matches)),
            }
        }
    }

    let mut inferred = 0;
    for (table, column, target) in resolved {
        if let Some(spec) = tables.get_mut(&table) {
            spec.extra_foreign_keys.insert(column, target);
            inferred += 1;
        }
    }

    let mut second_pass = Vec::new();
    for (table, column, candidates) in deferred {
        match prefer_end_of_chain(&candidates, tables) {
            Some(target) => {
                let key = key_values[&target].0.clone();
                second_pass.push((table, column, ColumnRef { table: target, column: key }));
            }
            None => tracing::debug!(
                event = "fk_ambiguous",
                table = %table,
                column = %column,
                candidates = candidates.len()
            ),
        }
    }
    for (table, column, target) in second_pass {
        if let Some(spec) = tables.get_mut(&table) {
            spec.extra_foreign_keys.insert(column, target);
            inferred += 1;
        }
    }

    Ok(inferred)
}

/// Integer-like declared types eligible for boolean mining.
fn is_integer_type(declared: &str) -> bool {
    let declared = declared.to_ascii_uppercase();
    declared.contains("INT") || declared.contains("BOOL")
}

/// Record columns whose observed values all lie in {0, 1}. Any null
/// disqualifies a column.
pub async fn mine_boolean_columns(
    pool: &SqlitePool,
    tables: &mut BTreeMap<String, TableSpec>,
    opts: &ProbeOptions,
) -> Result<usize> {
    let mut mined = 0;
    for (name, table) in tables.iter_mut() {
        let mut booleans = BTreeSet::new();
        for column in &table.columns {
            if !is_integer_type(&column.declared_type) {
                continue;
            }
            let profile = queries::boolean_profile(pool, name, &column.name).await?;
            let observed = profile.rows > 0;
            if profile.nulls == 0
                && profile.binary == profile.rows
                && (observed || !opts.require_observation)
            {
                booleans.insert(column.name.clone());
            }
        }
        mined += booleans.len();
        table.boolean_columns = booleans;
    }
    Ok(mined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn containment_requires_values_and_cardinality() {
        let units = keys(&["UNIT_A", "UNIT_B", "UNIT_C"]);
        assert!(is_contained(&strings(&["UNIT_A", "UNIT_C"]), &units));
        assert!(!is_contained(&strings(&["UNIT_A", "UNIT_Z"]), &units));
        assert!(!is_contained(&[], &units));
        assert!(!is_contained(&strings(&["UNIT_A", "UNIT_B"]), &keys(&["UNIT_A"])));
    }

    #[test]
    fn end_of_chain_breaks_ties() {
        let mut tables = BTreeMap::new();
        let units = TableSpec {
            name: "Units".to_string(),
            primary_key: vec!["UnitType".to_string()],
            ..TableSpec::default()
        };
        let mut upgrades = TableSpec {
            name: "UnitUpgrades".to_string(),
            primary_key: vec!["Unit".to_string()],
            ..TableSpec::default()
        };
        upgrades.foreign_keys.insert(
            "Unit".to_string(),
            ColumnRef {
                table: "Units".to_string(),
                column: "UnitType".to_string(),
            },
        );
        tables.insert("Units".to_string(), units);
        tables.insert("UnitUpgrades".to_string(), upgrades);

        let candidates = strings(&["UnitUpgrades", "Units"]);
        assert_eq!(prefer_end_of_chain(&candidates, &tables), Some("Units".to_string()));

        let tied = strings(&["Units", "Units2"]);
        tables.insert(
            "Units2".to_string(),
            TableSpec {
                name: "Units2".to_string(),
                primary_key: vec!["UnitType".to_string()],
                ..TableSpec::default()
            },
        );
        assert_eq!(prefer_end_of_chain(&tied, &tables), None);
    }

    #[test]
    fn integer_types_are_recognized() {
        assert!(is_integer_type("INTEGER"));
        assert!(is_integer_type("boolean"));
        assert!(!is_integer_type("TEXT"));
    }
}
