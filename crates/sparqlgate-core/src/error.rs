//! Error types for the mutation gateway
//!
//! [`GatewayError`] is the taxonomy every entry point reports:
//! - caller problems (`Unauthorized`, `AdmissionDenied`)
//! - guardrail and staging outcomes (`GuardrailRejection`, `TokenInvalid`,
//!   `NotAMutation`, `NothingToUndo`)
//! - remote failures, which are audited before they surface
//! - infrastructure errors from the store, audit log and configuration

use sparqlgate_audit::AuditError;
use sparqlgate_store::StoreError;
use std::path::PathBuf;

/// Main gateway error type
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or wrong API credential
    #[error("{0}")]
    Unauthorized(String),

    /// Caller exceeded the admission window
    #[error("rate limit exceeded for {identifier}, retry shortly")]
    AdmissionDenied {
        /// Identifier the window is kept for
        identifier: String,
    },

    /// The generation guardrail refused to produce a statement
    #[error("guardrail rejected the draft: {reason}")]
    GuardrailRejection {
        /// Why the draft was refused
        reason: String,
        /// The refused draft, possibly empty
        statement: String,
    },

    /// Confirmation token unknown, already used or expired
    #[error("invalid or expired confirmation token")]
    TokenInvalid,

    /// Statement does not write anything
    #[error("statement is not an update")]
    NotAMutation,

    /// An audit record without a usable undo statement
    #[error("record carries no usable undo statement")]
    NothingToUndo,

    /// The store rejected a write; the attempt has been audited
    #[error("update failed: {message}")]
    RemoteFailure {
        /// Remote error as reported by the store
        message: String,
    },

    /// Generation capability failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Store failure outside the audited write path
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Audit log failure
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Whether the caller can fix the request
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_)
                | Self::AdmissionDenied { .. }
                | Self::GuardrailRejection { .. }
                | Self::TokenInvalid
                | Self::NotAMutation
                | Self::NothingToUndo
        )
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AdmissionDenied { .. } => true,
            Self::Store(e) => e.is_retryable(),
            Self::Generation(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Generation capability errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// No credential configured for the capability
    #[error("generation capability not configured")]
    NotConfigured,

    /// The HTTP client could not be built
    #[error("client error: {0}")]
    Client(String),

    /// The request never produced a response
    #[error("network error: {0}")]
    Network(String),

    /// The capability answered with an error status
    #[error("api error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The reply could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override has the wrong shape
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(GatewayError::TokenInvalid.is_client_error());
        assert!(GatewayError::Unauthorized("API key missing.".into()).is_client_error());
        assert!(!GatewayError::RemoteFailure { message: "500".into() }.is_client_error());
    }

    #[test]
    fn retryable_errors() {
        assert!(GatewayError::AdmissionDenied { identifier: "k".into() }.is_retryable());
        assert!(GatewayError::Store(StoreError::Transport("reset".into())).is_retryable());
        assert!(GatewayError::Generation(GenerationError::Api {
            status: 429,
            body: String::new()
        })
        .is_retryable());
        assert!(!GatewayError::NotAMutation.is_retryable());
    }

    #[test]
    fn remote_failure_embeds_message() {
        let e = GatewayError::RemoteFailure {
            message: "store returned 400: Parse error".into(),
        };
        assert_eq!(e.to_string(), "update failed: store returned 400: Parse error");
    }
}
