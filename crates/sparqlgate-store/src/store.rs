//! The store seam

use crate::error::StoreError;
use crate::results::SelectResults;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Kind of store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Read/query call
    Select,
    /// Write/update call
    Update,
}

impl StoreOperation {
    /// Metric and log label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RDF triple store reachable through SPARQL
///
/// Implementations perform no retries beyond their own authentication
/// handshake.
#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Run a SELECT or ASK query
    async fn select(&self, query: &str) -> Result<SelectResults, StoreError>;

    /// Run a SPARQL Update
    async fn update(&self, update: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: TripleStore + ?Sized> TripleStore for Arc<T> {
    async fn select(&self, query: &str) -> Result<SelectResults, StoreError> {
        (**self).select(query).await
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        (**self).update(update).await
    }
}
