//! Apache Jena Fuseki over HTTP
//!
//! Queries go to `{base}/{dataset}/sparql`, updates to
//! `{base}/{dataset}/update`, both as form posts. Queries are tried
//! anonymously first and repeated once with basic auth when the server
//! answers 401 or 403; updates always authenticate.

use crate::error::StoreError;
use crate::results::SelectResults;
use crate::store::TripleStore;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Connection settings for the triple store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Server root, e.g. `http://localhost:3030`
    pub base_url: String,
    /// Dataset name
    pub dataset: String,
    /// Basic-auth user
    pub user: String,
    /// Basic-auth password
    pub password: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3030".to_string(),
            dataset: "combined".to_string(),
            user: "admin".to_string(),
            password: "admin".to_string(),
            timeout_secs: 60,
        }
    }
}

impl StoreConfig {
    /// Dataset root URL without a trailing slash
    #[must_use]
    pub fn dataset_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.dataset.trim_matches('/')
        )
    }

    /// Query endpoint
    #[must_use]
    pub fn query_url(&self) -> String {
        format!("{}/sparql", self.dataset_url())
    }

    /// Update endpoint
    #[must_use]
    pub fn update_url(&self) -> String {
        format!("{}/update", self.dataset_url())
    }
}

/// Fuseki SPARQL client
#[derive(Debug, Clone)]
pub struct FusekiStore {
    client: Client,
    config: StoreConfig,
}

impl FusekiStore {
    /// Build a client for the given store
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Client`] when the HTTP client cannot be built.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Connection settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn query_request(&self, query: &str) -> RequestBuilder {
        self.client
            .post(self.config.query_url())
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)])
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.config.user, Some(&self.config.password))
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl TripleStore for FusekiStore {
    async fn select(&self, query: &str) -> Result<SelectResults, StoreError> {
        let mut response = self.query_request(query).send().await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!(status = %response.status(), "retrying query with credentials");
            response = self
                .authenticated(self.query_request(query))
                .send()
                .await?;
        }

        let response = ensure_success(response).await?;
        response
            .json::<SelectResults>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.config.update_url())
            .form(&[("update", update)]);
        let response = self.authenticated(request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
