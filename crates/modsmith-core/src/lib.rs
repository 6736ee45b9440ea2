//! Core contracts shared by the modsmith engines.
//!
//! This crate defines the parsed document tree, the statement records the
//! compiler emits, the SQL renderer, the inferred schema snapshot, and the
//! diagnostic types every engine reports through.

pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod node;
pub mod render;
pub mod schema;
pub mod statement;
pub mod validation;

pub use diagnostics::{Diagnostic, DiagnosticReport, Severity};
pub use error::{Error, Result};
pub use graph::{build_backlinks, pk_chain, resolve_origin_pks};
pub use node::{ATTR_PREFIX, NodeMap, ParsedNode, TEXT_KEY};
pub use render::{normalize_value, render_statement, render_value};
pub use schema::{
    ColumnRef, ColumnSpec, DatabaseSpec, SchemaHandle, SchemaSnapshot, TableSpec,
};
pub use statement::{ColumnDef, SourcedStatement, SqlValue, StatementKind, StatementRecord, TableDef};
pub use validation::validate_snapshot;

/// Current contract version for cached schema snapshots.
pub const SCHEMA_VERSION: &str = "0.1";
