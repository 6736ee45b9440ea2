use thiserror::Error;

/// Core error type shared across modsmith crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error or adapter failure.
    #[error("database error: {0}")]
    Db(String),
    /// The schema snapshot violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A statement record could not be turned into SQL text.
    #[error("render error: {0}")]
    Render(String),
    /// Column and value lists of an insert-family record differ in length.
    #[error("arity mismatch for {table}: {columns} column(s), {values} value(s)")]
    Arity {
        table: String,
        columns: usize,
        values: usize,
    },
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by modsmith crates.
pub type Result<T> = std::result::Result<T, Error>;
