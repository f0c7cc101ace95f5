//! Audit log errors

/// Errors raised while writing, reading or verifying the audit log
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Underlying file operation failed
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A line is not a valid record
    #[error("malformed audit record at line {line}")]
    Malformed {
        /// 1-based line number
        line: usize,
    },

    /// The hash chain is broken
    #[error("audit chain broken at line {line}")]
    IntegrityViolation {
        /// 1-based line number of the first bad record
        line: usize,
    },

    /// A pseudonymized field name does not form a valid pattern
    #[error("invalid pseudonym field {field:?}: {reason}")]
    InvalidField {
        /// Configured field
        field: String,
        /// Pattern compiler message
        reason: String,
    },

    /// The pseudonym key was rejected
    #[error("invalid pseudonym key")]
    InvalidKey,
}

impl AuditError {
    /// Whether the log content itself is damaged
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::IntegrityViolation { .. }
        )
    }
}
