use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing the snapshot cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache {path} has schema version {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: String,
        expected: String,
    },
    #[error("invalid path for atomic write: {0}")]
    InvalidPath(PathBuf),
    #[error(transparent)]
    Core(#[from] modsmith_core::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
