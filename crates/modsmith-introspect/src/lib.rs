//! Schema inference over reference SQLite databases.

pub mod adapter;
pub mod atomic;
pub mod cache;
pub mod errors;
pub mod options;
pub mod sqlite;

pub use adapter::Adapter;
pub use cache::{SnapshotCache, latest_modified};
pub use errors::{CacheError, CacheResult};
pub use options::ProbeOptions;
pub use sqlite::{SqliteAdapter, probe_databases, probe_pool};

pub use modsmith_core::{DatabaseSpec, SchemaSnapshot};
