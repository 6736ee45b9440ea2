//! Apply rendered SQL to a scratch copy of a reference database, healing
//! the failures that have a safe repair and reporting the rest.

pub mod classify;
mod errors;
pub mod heal;
pub mod report;
pub mod scratch;
pub mod sqlparse;
pub mod status;
pub mod validator;

pub use classify::{ErrorClass, FailureKind, classify};
pub use errors::{ApplyError, Result};
pub use report::{
    BatchOutcome, BatchSummary, FkViolation, HealAction, HealedEntry, Provenance, ReportEntry,
    ValidationReport,
};
pub use scratch::ScratchDatabase;
pub use sqlparse::{ParsedInsert, parse_insert};
pub use status::{Done, StatusSender, done_channel, status_channel};
pub use validator::{Batch, Validator, ValidatorOptions};
