use std::path::{Path, PathBuf};

use sqlx::ConnectOptions;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

use crate::errors::{ApplyError, Result};

const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// Disposable copy of a reference database. The source file is never
/// opened for writing.
#[derive(Debug, Clone)]
pub struct ScratchDatabase {
    source: PathBuf,
    path: PathBuf,
}

impl ScratchDatabase {
    /// Copy `source` to `scratch_path`, replacing any previous scratch copy.
    pub fn create(source: &Path, scratch_path: &Path) -> Result<Self> {
        let canonical_source = source.canonicalize().map_err(|err| ApplyError::Io {
            path: source.to_path_buf(),
            source: err,
        })?;
        if let Ok(existing) = scratch_path.canonicalize() {
            if existing == canonical_source {
                return Err(ApplyError::SameFile(scratch_path.to_path_buf()));
            }
        }
        if let Some(parent) = scratch_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| ApplyError::Io {
                path: parent.to_path_buf(),
                source: err,
            })?;
        }
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = scratch_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar).map_err(|err| ApplyError::Io {
                    path: sidecar.clone(),
                    source: err,
                })?;
            }
        }
        std::fs::copy(source, scratch_path).map_err(|err| ApplyError::Io {
            path: scratch_path.to_path_buf(),
            source: err,
        })?;
        tracing::info!(
            event = "scratch_created",
            source = %source.display(),
            scratch = %scratch_path.display()
        );
        Ok(Self {
            source: source.to_path_buf(),
            path: scratch_path.to_path_buf(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a single connection with foreign keys enforced.
    pub async fn connect(&self) -> Result<SqliteConnection> {
        let conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(false)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Delete)
            .connect()
            .await?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_to_overwrite_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Gameplay.sqlite");
        std::fs::write(&source, b"db").unwrap();

        let err = ScratchDatabase::create(&source, &source).unwrap_err();
        assert!(matches!(err, ApplyError::SameFile(_)));
        assert_eq!(std::fs::read(&source).unwrap(), b"db");
    }

    #[test]
    fn copies_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Gameplay.sqlite");
        std::fs::write(&source, b"db").unwrap();
        let target = dir.path().join("scratch").join("copy.sqlite");

        let scratch = ScratchDatabase::create(&source, &target).unwrap();
        assert_eq!(scratch.path(), target.as_path());
        assert_eq!(std::fs::read(&target).unwrap(), b"db");
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScratchDatabase::create(&dir.path().join("none.sqlite"), &dir.path().join("s.sqlite"))
            .unwrap_err();
        assert!(matches!(err, ApplyError::Io { .. }));
    }
}
