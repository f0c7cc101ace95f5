//! Validation against the live allow-list

use crate::terms::AllowedTermCache;
use async_trait::async_trait;
use sparqlgate_statement::{check, ValidationResult};

/// Something that can validate a statement
///
/// Validation is advisory; implementations never fail.
#[async_trait]
pub trait StatementValidator: Send + Sync {
    /// Validate one statement
    async fn validate(&self, statement: &str) -> ValidationResult;
}

/// Validates statements against [`AllowedTermCache`]
///
/// An unavailable cache degrades to an empty allow-list, which turns every
/// referenced term into a warning.
#[derive(Debug, Clone)]
pub struct Validator {
    terms: AllowedTermCache,
}

impl Validator {
    /// Validator over the given cache
    #[must_use]
    pub fn new(terms: AllowedTermCache) -> Self {
        Self { terms }
    }

    /// The underlying cache
    #[inline]
    #[must_use]
    pub fn terms(&self) -> &AllowedTermCache {
        &self.terms
    }
}

#[async_trait]
impl StatementValidator for Validator {
    async fn validate(&self, statement: &str) -> ValidationResult {
        let snapshot = self.terms.get_or_empty().await;
        check(statement, &snapshot)
    }
}
