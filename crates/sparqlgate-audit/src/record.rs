//! Audit record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sparqlgate_statement::{Explanation, ValidationResult};
use std::fmt;

/// Hash that precedes the first record of a log
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Outcome recorded for an attempted mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// A confirmed statement was written
    Applied,
    /// The store rejected a confirmed statement
    Failed,
    /// An undo statement was written
    UndoApplied,
    /// The store rejected an undo statement
    UndoFailed,
}

impl AuditStatus {
    /// Wire label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::UndoApplied => "undo_applied",
            Self::UndoFailed => "undo_failed",
        }
    }

    /// Whether the store accepted the statement
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Applied | Self::UndoApplied)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log
///
/// `statement` and `undo_statement` hold masked text once the record has
/// been appended. `prev_hash` and `hash` are filled in by the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Outcome
    pub status: AuditStatus,
    /// Statement as staged, before placeholder rehydration
    pub statement: String,
    /// Advisory validation of the statement
    pub validation: ValidationResult,
    /// Shape and touched predicates
    pub explanation: Explanation,
    /// Inverse statement, when one could be derived
    pub undo_statement: Option<String>,
    /// Remote error message for failed attempts
    pub error: Option<String>,
    /// Hash of the preceding record
    #[serde(default)]
    pub prev_hash: String,
    /// Hash over this record's content and `prev_hash`
    #[serde(default)]
    pub hash: String,
}

impl AuditRecord {
    /// Start a record stamped with the current time
    #[must_use]
    pub fn new(
        status: AuditStatus,
        statement: impl Into<String>,
        validation: ValidationResult,
        explanation: Explanation,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            statement: statement.into(),
            validation,
            explanation,
            undo_statement: None,
            error: None,
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    /// Attach the inverse statement
    #[must_use]
    pub fn with_undo(mut self, undo: Option<String>) -> Self {
        self.undo_statement = undo;
        self
    }

    /// Attach the remote error
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Content hash chained onto `prev_hash`
    ///
    /// # Errors
    ///
    /// Fails only if the nested analysis cannot be encoded.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update([0]);
        hasher.update(self.status.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.statement.as_bytes());
        hasher.update([0]);
        hasher.update(serde_json::to_vec(&self.validation)?);
        hasher.update(serde_json::to_vec(&self.explanation)?);
        hasher.update(self.undo_statement.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.error.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.prev_hash.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}
