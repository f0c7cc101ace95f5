//! Testing utilities for the sparqlgate workspace
//!
//! In-memory stand-ins for the two remote collaborators, plus fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sparqlgate_core::{GatewayConfig, GenerationCapability, GenerationError, GenerationRequest};
use sparqlgate_statement::VOC_NAMESPACE;
use sparqlgate_store::{RdfTerm, SelectResults, StoreError, TripleStore, CLASSES_QUERY, PROPERTIES_QUERY};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Triple store that answers schema queries from a fixed allow-list and
/// records every update.
#[derive(Debug, Default)]
pub struct FakeStore {
    classes: Vec<String>,
    properties: Vec<String>,
    canned: Mutex<Option<SelectResults>>,
    updates: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    fail_updates: AtomicBool,
    fail_selects: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store knowing the vocabulary used by the fixtures
    pub fn with_vocabulary() -> Self {
        Self::new()
            .with_classes([voc("Pfarrer-in")])
            .with_properties([voc("vorname"), voc("nachname"), voc("hatStelle")])
    }

    pub fn with_classes<I: IntoIterator<Item = String>>(mut self, classes: I) -> Self {
        self.classes = classes.into_iter().collect();
        self
    }

    pub fn with_properties<I: IntoIterator<Item = String>>(mut self, properties: I) -> Self {
        self.properties = properties.into_iter().collect();
        self
    }

    /// Results returned for any non-schema query
    pub fn with_select_results(self, results: SelectResults) -> Self {
        *self.canned.lock() = Some(results);
        self
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_selects(&self, fail: bool) {
        self.fail_selects.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl TripleStore for FakeStore {
    async fn select(&self, query: &str) -> Result<SelectResults, StoreError> {
        self.queries.lock().push(query.to_string());
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        if query == CLASSES_QUERY {
            return Ok(SelectResults::from_column("x", self.classes.iter().map(RdfTerm::uri)));
        }
        if query == PROPERTIES_QUERY {
            return Ok(SelectResults::from_column("p", self.properties.iter().map(RdfTerm::uri)));
        }
        Ok(self.canned.lock().clone().unwrap_or_default())
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Remote {
                status: 400,
                body: "Lexical error at line 1".to_string(),
            });
        }
        self.updates.lock().push(update.to_string());
        Ok(())
    }
}

/// Generation capability replaying queued replies in order
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a reply wrapping `statement` in a fenced block
    pub fn reply_statement(self, statement: &str) -> Self {
        self.reply(fenced(statement))
    }

    pub fn fail(self, error: GenerationError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationCapability for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::InvalidResponse("script exhausted".to_string())))
    }
}

/// Vocabulary IRI for a local name
pub fn voc(local: &str) -> String {
    format!("{VOC_NAMESPACE}{local}")
}

pub fn fenced(statement: &str) -> String {
    format!("```sparql\n{statement}\n```")
}

/// Configuration writing its logs under `dir`, without auth
pub fn test_config(dir: &Path) -> GatewayConfig {
    GatewayConfig::new()
        .with_changes_graph("urn:test:changes")
        .with_audit_log_file(dir.join("audit.jsonl"))
        .with_perf_log_file(Some(dir.join("perf.jsonl")))
}
