use std::collections::{BTreeMap, BTreeSet};

use crate::schema::TableSpec;

/// Recompute every table's backlinks from declared and inferred foreign keys.
pub fn build_backlinks(tables: &mut BTreeMap<String, TableSpec>) {
    let mut incoming: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (name, table) in tables.iter() {
        for target in table
            .foreign_keys
            .values()
            .chain(table.extra_foreign_keys.values())
        {
            incoming
                .entry(target.table.clone())
                .or_default()
                .insert(name.clone());
        }
    }

    for (name, table) in tables.iter_mut() {
        table.backlinks = incoming.remove(name).unwrap_or_default();
    }
}

/// Follow the single-column primary key of `start` through foreign keys.
///
/// The chain starts with `start` and ends at the first table whose key is not
/// a single-column foreign key, a table in `stop_tables`, a table missing from
/// the map, or a table already visited.
pub fn pk_chain(
    tables: &BTreeMap<String, TableSpec>,
    start: &str,
    stop_tables: &BTreeSet<String>,
) -> Vec<String> {
    let mut chain = vec![start.to_string()];
    let mut visited = BTreeSet::from([start.to_string()]);
    let mut current = start.to_string();

    loop {
        let Some(table) = tables.get(&current) else {
            break;
        };
        let Some(pk) = table.single_pk() else {
            break;
        };
        let Some(target) = table.reference(pk) else {
            break;
        };
        if !visited.insert(target.table.clone()) {
            break;
        }
        chain.push(target.table.clone());
        if stop_tables.contains(&target.table) {
            break;
        }
        current = target.table.clone();
    }

    chain
}

/// Set `origin_pk` on every table.
///
/// A table is an origin when it has a single-column key whose chain reaches
/// no table outside `stop_tables`.
pub fn resolve_origin_pks(tables: &mut BTreeMap<String, TableSpec>, stop_tables: &BTreeSet<String>) {
    let origins: BTreeMap<String, bool> = tables
        .iter()
        .map(|(name, table)| {
            let origin = table.single_pk().is_some()
                && pk_chain(tables, name, stop_tables)
                    .iter()
                    .skip(1)
                    .all(|hop| stop_tables.contains(hop));
            (name.clone(), origin)
        })
        .collect();

    for (name, origin) in origins {
        if let Some(table) = tables.get_mut(&name) {
            table.origin_pk = origin;
        }
    }
}
