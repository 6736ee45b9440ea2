//! Tolerant XML reader producing positional [`ParsedNode`] trees.
//!
//! Malformed input is retried through a bounded list of textual repairs
//! before a read failure is reported.

pub mod error;
pub mod reader;
pub mod repair;
mod tree;

pub use error::{ReadError, Result};
pub use reader::{Document, MAX_REPAIR_ATTEMPTS, ReadOutcome, Section, read_document, read_str};
pub use repair::Repair;

pub use modsmith_core::ParsedNode;
