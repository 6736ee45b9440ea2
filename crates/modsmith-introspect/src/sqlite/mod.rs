use std::collections::BTreeMap;
use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use modsmith_core::{
    DatabaseSpec, Error, Result, SchemaSnapshot, build_backlinks, resolve_origin_pks,
    validate_snapshot,
};

use crate::adapter::Adapter;
use crate::options::ProbeOptions;

pub mod infer;
mod mapper;
pub mod queries;

/// Adapter for reference SQLite databases, opened read-only.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    name: String,
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Create a new adapter using a pre-configured pool.
    pub fn new(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// Open `path` read-only. A database that cannot be opened is fatal for
    /// the whole probe.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| Error::Db(format!("cannot open {}: {err}", path.display())))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, pool))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Adapter for SqliteAdapter {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    async fn probe(&self, opts: &ProbeOptions) -> Result<DatabaseSpec> {
        probe_pool(&self.pool, &self.name, opts).await
    }
}

/// Probe one database: catalog, declared keys, inferred keys, booleans,
/// backlinks and origin keys.
pub async fn probe_pool(pool: &SqlitePool, name: &str, opts: &ProbeOptions) -> Result<DatabaseSpec> {
    let mut tables = BTreeMap::new();
    let mut raw_foreign_keys = BTreeMap::new();

    for table_name in queries::list_tables(pool).await? {
        let raw_columns = queries::list_columns(pool, &table_name).await?;
        let raw_fks = queries::list_foreign_keys(pool, &table_name).await?;
        raw_foreign_keys.insert(table_name.clone(), raw_fks);
        tables.insert(table_name.clone(), mapper::map_table(table_name, raw_columns));
    }
    mapper::map_foreign_keys(&mut tables, raw_foreign_keys);

    let inferred = if opts.infer_foreign_keys {
        infer::infer_foreign_keys(pool, &mut tables, opts).await?
    } else {
        0
    };
    let booleans = if opts.mine_booleans {
        infer::mine_boolean_columns(pool, &mut tables, opts).await?
    } else {
        0
    };

    build_backlinks(&mut tables);
    resolve_origin_pks(&mut tables, &opts.stop_set());

    tracing::info!(
        event = "database_probed",
        database = %name,
        tables = tables.len(),
        inferred_foreign_keys = inferred,
        boolean_columns = booleans
    );

    Ok(DatabaseSpec {
        name: name.to_string(),
        tables,
    })
}

/// Probe every database in order and assemble a validated snapshot.
///
/// Any database that fails to open or probe aborts the run; no partial
/// snapshot is returned.
pub async fn probe_databases(
    paths: &[impl AsRef<Path>],
    opts: &ProbeOptions,
    watermark: Option<i64>,
) -> Result<SchemaSnapshot> {
    let mut databases = Vec::with_capacity(paths.len());
    for path in paths {
        let adapter = SqliteAdapter::open(path.as_ref()).await?;
        let database = adapter.probe(opts).await;
        adapter.pool.close().await;
        databases.push(database?);
    }
    let snapshot = SchemaSnapshot::new(databases, watermark);
    validate_snapshot(&snapshot)?;
    Ok(snapshot)
}
