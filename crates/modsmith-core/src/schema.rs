use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SCHEMA_VERSION;

/// Inferred schema for every probed reference database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    /// Contract version for this snapshot format.
    pub schema_version: String,
    /// Database engine identifier (always `sqlite`).
    pub engine: String,
    /// Newest game file modification time (unix seconds) seen at build time.
    pub watermark: Option<i64>,
    /// SHA-256 of the canonical JSON of `databases`.
    pub fingerprint: Option<String>,
    pub databases: Vec<DatabaseSpec>,
}

/// Tables of one reference database keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSpec {
    pub name: String,
    pub tables: BTreeMap<String, TableSpec>,
}

/// Column metadata as reported by the engine catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position inside the primary key, 0 when not part of it.
    pub pk_ordinal: u32,
}

/// A referenced table and column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// Declared and inferred relationships for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
    /// Not-null columns without a default.
    pub primary_columns: Vec<String>,
    pub secondary_columns: Vec<String>,
    /// Declared foreign keys: column to referenced table/column.
    pub foreign_keys: BTreeMap<String, ColumnRef>,
    /// Foreign keys inferred from data containment.
    pub extra_foreign_keys: BTreeMap<String, ColumnRef>,
    /// Tables whose declared or inferred foreign keys point here.
    pub backlinks: BTreeSet<String>,
    /// Integer columns whose observed values are all 0 or 1.
    pub boolean_columns: BTreeSet<String>,
    /// Single-column primary key that is not itself a foreign key.
    pub origin_pk: bool,
}

impl TableSpec {
    /// The primary key column when the key has exactly one column.
    pub fn single_pk(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [column] => Some(column),
            _ => None,
        }
    }

    /// Declared or inferred reference for `column`.
    pub fn reference(&self, column: &str) -> Option<&ColumnRef> {
        self.foreign_keys
            .get(column)
            .or_else(|| self.extra_foreign_keys.get(column))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns
            .iter()
            .any(|spec| spec.name.eq_ignore_ascii_case(column))
    }
}

impl SchemaSnapshot {
    pub fn new(databases: Vec<DatabaseSpec>, watermark: Option<i64>) -> Self {
        let mut snapshot = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            engine: "sqlite".to_string(),
            watermark,
            fingerprint: None,
            databases,
        };
        snapshot.fingerprint = Some(snapshot.compute_fingerprint());
        snapshot
    }

    /// First table named `name` across databases, in probe order.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.databases
            .iter()
            .find_map(|database| database.tables.get(name))
    }

    pub fn table_count(&self) -> usize {
        self.databases
            .iter()
            .map(|database| database.tables.len())
            .sum()
    }

    pub fn compute_fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.databases).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

/// Read-shared handle onto the current snapshot.
///
/// Readers get an `Arc` that stays valid while a rebuild publishes a
/// replacement; snapshots are never mutated in place.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    inner: Arc<ArcSwap<SchemaSnapshot>>,
}

impl SchemaHandle {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    pub fn load(&self) -> Arc<SchemaSnapshot> {
        self.inner.load_full()
    }

    /// Replace the published snapshot wholesale.
    pub fn publish(&self, snapshot: SchemaSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

impl Default for SchemaHandle {
    fn default() -> Self {
        Self::new(SchemaSnapshot::default())
    }
}
