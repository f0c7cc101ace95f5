//! Audit trail for applied and attempted mutations
//!
//! Records are pseudonymized at append time, chained by SHA-256 and
//! persisted as newline-delimited JSON. The text sent to the store is never
//! masked; only the two statement fields of a record are.

pub mod error;
pub mod log;
pub mod pseudonym;
pub mod record;

pub use error::AuditError;
pub use log::{AuditLog, MAX_TAIL};
pub use pseudonym::{PseudonymConfig, Pseudonymizer, PSEUDONYM_PREFIX};
pub use record::{AuditRecord, AuditStatus, GENESIS_HASH};
