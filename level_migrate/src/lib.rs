//! Level payload migration between client schema revisions.
#![forbid(unsafe_code)]

pub mod completion;
mod error;
pub mod fixup;
pub mod migrate;

pub use completion::{completion_table, CompletionTable, ObjectKind, KNOWN_REVISIONS};
pub use error::MigrateError;
pub use fixup::fix_legacy_level;
pub use migrate::{migrate_level, Branch, LEGACY_LEVEL_THRESHOLD};
