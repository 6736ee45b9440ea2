use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a validation run.
///
/// Statement failures never surface here; they become report entries.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("database error: {0}")]
    Db(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scratch path {0} is the source database")]
    SameFile(PathBuf),
    #[error(transparent)]
    Core(#[from] modsmith_core::Error),
}

impl From<sqlx::Error> for ApplyError {
    fn from(err: sqlx::Error) -> Self {
        ApplyError::Db(err.to_string())
    }
}

/// Result type for apply operations.
pub type Result<T> = std::result::Result<T, ApplyError>;
