//! Durable snapshot cache keyed by a game-installation watermark.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use modsmith_core::{SCHEMA_VERSION, SchemaHandle, SchemaSnapshot, validate_snapshot};

use crate::atomic::write_json_atomic;
use crate::errors::{CacheError, CacheResult};

/// Newest file modification time under `dir`, in unix seconds.
pub fn latest_modified(dir: &Path) -> CacheResult<Option<i64>> {
    let mut latest: Option<i64> = None;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|err| {
            CacheError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("directory walk failed")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry.metadata().map_err(|err| {
            CacheError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("metadata unavailable")
            }))
        })?;
        let Ok(modified) = modified.modified() else {
            continue;
        };
        let seconds = modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        latest = Some(latest.map_or(seconds, |current| current.max(seconds)));
    }
    Ok(latest)
}

/// Cached snapshot file plus the handle it is published through.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
    handle: SchemaHandle,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>, handle: SchemaHandle) -> Self {
        Self {
            path: path.into(),
            handle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> &SchemaHandle {
        &self.handle
    }

    fn read(&self) -> CacheResult<Option<SchemaSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&self.path)?;
        let snapshot: SchemaSnapshot = serde_json::from_slice(&content)?;
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(CacheError::Version {
                path: self.path.clone(),
                found: snapshot.schema_version,
                expected: SCHEMA_VERSION.to_string(),
            });
        }
        Ok(Some(snapshot))
    }

    /// Load the cached snapshot and publish it. `None` when no cache exists.
    pub fn load(&self) -> CacheResult<Option<SchemaSnapshot>> {
        let Some(snapshot) = self.read()? else {
            return Ok(None);
        };
        validate_snapshot(&snapshot)?;
        self.handle.publish(snapshot.clone());
        tracing::info!(
            event = "schema_cache_loaded",
            path = %self.path.display(),
            tables = snapshot.table_count()
        );
        Ok(Some(snapshot))
    }

    /// True when the cache is missing, unreadable, lacks a watermark, or the
    /// game directory holds a file newer than the watermark.
    pub fn needs_rebuild(&self, game_dir: Option<&Path>) -> CacheResult<bool> {
        let stored = match self.read() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(true),
            Err(err) => {
                tracing::warn!(event = "schema_cache_unusable", error = %err);
                return Ok(true);
            }
        };
        let Some(game_dir) = game_dir else {
            return Ok(false);
        };
        let latest = latest_modified(game_dir)?;
        Ok(match (stored.watermark, latest) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(watermark), Some(latest)) => latest > watermark,
        })
    }

    /// Validate, write atomically, then publish.
    pub fn store(&self, snapshot: SchemaSnapshot) -> CacheResult<()> {
        validate_snapshot(&snapshot)?;
        write_json_atomic(&self.path, &snapshot)?;
        tracing::info!(
            event = "schema_cache_stored",
            path = %self.path.display(),
            tables = snapshot.table_count(),
            fingerprint = snapshot.fingerprint.as_deref().unwrap_or("")
        );
        self.handle.publish(snapshot);
        Ok(())
    }
}
