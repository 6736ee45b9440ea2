use thiserror::Error;

/// Errors that stop compilation outright.
///
/// Per-file read failures and authoring defects are diagnostics, not errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("core error: {0}")]
    Core(#[from] modsmith_core::Error),
}

/// Result type for compile operations.
pub type Result<T> = std::result::Result<T, CompileError>;
