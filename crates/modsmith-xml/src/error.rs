use std::path::PathBuf;

use thiserror::Error;

/// Failures reading a document.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The document stayed unparsable after every applicable repair; this is
    /// the error of the first attempt.
    #[error("xml parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Result type for document reads.
pub type Result<T> = std::result::Result<T, ReadError>;
