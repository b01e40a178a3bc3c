//! JSON → SQLite migration tooling
//!
//! - [`validator`]: structural checks over the raw flat file
//! - [`migrator`]: backup, validate, single-transaction bulk insert
//! - [`rollback`]: restore a JSON backup and clear the relational tables
//! - [`verifier`]: post-migration comparison with an integrity score

pub mod migrator;
pub mod rollback;
pub mod validator;
pub mod verifier;

pub use migrator::{JsonToSqliteMigrator, MigrationBatch, MigrationOptions, MigrationReport};
pub use rollback::{RollbackManager, RollbackReport};
pub use validator::{validate_document, ValidationReport};
pub use verifier::{Discrepancy, MigrationVerifier, VerificationReport};
