use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Options that control how probing behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeOptions {
    /// Generic reference table that is never an inferred foreign key target.
    pub catch_all_table: String,
    /// Tables that end a primary key chain.
    pub stop_tables: Vec<String>,
    /// Only call a column boolean when at least one value was observed.
    pub require_observation: bool,
    pub infer_foreign_keys: bool,
    pub mine_booleans: bool,
}

impl ProbeOptions {
    pub fn stop_set(&self) -> BTreeSet<String> {
        self.stop_tables.iter().cloned().collect()
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            catch_all_table: "Types".to_string(),
            stop_tables: vec!["Types".to_string(), "Kinds".to_string()],
            require_observation: true,
            infer_foreign_keys: true,
            mine_booleans: true,
        }
    }
}
