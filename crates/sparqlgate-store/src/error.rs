//! Store errors

/// Errors raised by a triple store or its instrumentation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The HTTP client could not be built
    #[error("store client error: {0}")]
    Client(String),

    /// The request never produced a response
    #[error("store unreachable: {0}")]
    Transport(String),

    /// The store answered with a non-success status
    #[error("store returned {status}: {body}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Response body as sent by the store
        body: String,
    },

    /// The response body was not valid SPARQL JSON
    #[error("invalid store response: {0}")]
    Decode(String),

    /// The performance log could not be written or read
    #[error("performance log error: {0}")]
    PerfLog(String),
}

impl StoreError {
    /// HTTP status attached to the error, if any
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the failure is likely transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Client(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(StoreError::Transport("reset".into()).is_retryable());
        assert!(StoreError::Remote { status: 503, body: String::new() }.is_retryable());
        assert!(!StoreError::Remote { status: 400, body: "parse error".into() }.is_retryable());
        assert_eq!(
            StoreError::Remote { status: 401, body: String::new() }.status(),
            Some(401)
        );
    }
}
