use async_trait::async_trait;

use modsmith_core::{DatabaseSpec, Result};

use crate::options::ProbeOptions;

/// Trait implemented by database adapters that can probe a reference schema.
#[async_trait]
pub trait Adapter {
    /// Returns the engine identifier (e.g. `sqlite`).
    fn engine(&self) -> &'static str;

    /// Probe the database and return its inferred tables.
    async fn probe(&self, opts: &ProbeOptions) -> Result<DatabaseSpec>;
}
