//! The mutation gateway
//!
//! [`MutationGateway`] is the single entry point a transport layer talks
//! to. Every operation first authenticates the [`Caller`] and passes the
//! admission gate, then runs its slice of the pipeline:
//!
//! ```text
//! free text -> scrub -> guardrail -> scope -> validate + explain -> stage
//! token     -> consume -> rehydrate -> store write -> audit -> undo text
//! ```

use crate::admission::{AdmissionGate, AdmissionPolicy};
use crate::config::GatewayConfig;
use crate::confirmation::{ConfirmationStore, StagedStatement};
use crate::error::GatewayError;
use crate::executor::{ExecutionOutcome, MutationExecutor};
use crate::generation::{GenerationCapability, OpenAiGenerator};
use crate::guardrail::{Draft, GenerationGuardrail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sparqlgate_audit::{AuditLog, AuditRecord, Pseudonymizer};
use sparqlgate_statement::{
    explain, is_mutation, Explanation, GraphScoper, Intent, PlaceholderMap, TermSnapshot,
    ValidationResult,
};
use sparqlgate_store::{
    AllowedTermCache, FusekiStore, InstrumentedStore, PerfLog, PerfSummary, SelectResults,
    StatementValidator, TripleStore, Validator, MAX_WINDOW_MINUTES,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

static MASKED_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']px-[a-z2-7]{8}["']"#).expect("valid regex"));

/// Identity of whoever is calling
///
/// Admission is keyed on a credential presented as an API key, or on the
/// origin otherwise. A bearer token authenticates but does not key the
/// admission window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Presented API credential
    pub api_key: Option<String>,
    /// Network origin, e.g. the client address
    pub origin: Option<String>,
    bearer: bool,
}

impl Caller {
    /// Anonymous caller
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With presented credential
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self.bearer = false;
        self
    }

    /// With network origin
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Caller from transport headers
    ///
    /// The `x-api-key` header wins over an `Authorization: Bearer` token.
    #[must_use]
    pub fn from_headers(
        api_key_header: Option<&str>,
        authorization: Option<&str>,
        origin: Option<&str>,
    ) -> Self {
        let bearer = authorization.and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
        let header = api_key_header.map(str::trim).filter(|k| !k.is_empty());
        let api_key = header
            .or(bearer.filter(|k| !k.is_empty()))
            .map(str::to_string);

        Self {
            bearer: header.is_none() && api_key.is_some(),
            api_key,
            origin: origin.map(str::to_string),
        }
    }

    /// Key the admission window is kept under
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.api_key
            .as_deref()
            .filter(|_| !self.bearer)
            .or(self.origin.as_deref())
            .unwrap_or("unknown")
    }
}

/// A statement staged for confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// Confirmation token; `None` when nothing was staged
    pub token: Option<String>,
    /// Statement as staged
    pub statement: String,
    /// Advisory validation
    pub validation: ValidationResult,
    /// Shape and touched predicates
    pub explanation: Explanation,
}

/// Result of generating a statement from free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    /// Intent the generation was tagged with
    pub intent: Intent,
    /// Generation rounds used
    pub attempts: u32,
    /// Literals hidden from the capability
    pub placeholders: PlaceholderMap,
    /// The staged statement; reads come back without a token
    pub preview: Preview,
}

/// What to revert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoSource {
    /// An undo statement as returned by a previous execution
    Statement(String),
    /// An audit record carrying an undo statement
    Record(Box<AuditRecord>),
}

/// Guarded mutation pipeline over a triple store
pub struct MutationGateway {
    config: GatewayConfig,
    store: Arc<dyn TripleStore>,
    terms: AllowedTermCache,
    validator: Arc<Validator>,
    scoper: GraphScoper,
    guardrail: GenerationGuardrail,
    confirmations: ConfirmationStore,
    executor: MutationExecutor,
    admission: AdmissionGate,
    perf: Option<Arc<PerfLog>>,
}

impl std::fmt::Debug for MutationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGateway")
            .field("graph", &self.scoper.graph())
            .field("pending", &self.confirmations.len())
            .field("admission", &self.admission.policy())
            .finish_non_exhaustive()
    }
}

impl MutationGateway {
    /// Gateway over the given store and generation capability
    ///
    /// The store is wrapped for latency metrics and the performance log.
    ///
    /// # Errors
    ///
    /// Returns an error when the pseudonymizer cannot be built or the audit
    /// log cannot be opened.
    pub async fn new(
        config: GatewayConfig,
        store: Arc<dyn TripleStore>,
        generator: Arc<dyn GenerationCapability>,
    ) -> Result<Self, GatewayError> {
        let perf = config
            .perf_log_file
            .as_ref()
            .map(|path| Arc::new(PerfLog::new(path.clone())));
        let mut instrumented = InstrumentedStore::new(store);
        if let Some(perf) = &perf {
            instrumented = instrumented.with_perf_log(Arc::clone(perf));
        }
        let store: Arc<dyn TripleStore> = Arc::new(instrumented);

        let pseudonymizer = Pseudonymizer::new(&config.pseudonym)?;
        let audit = Arc::new(AuditLog::open(config.audit_log_file.clone(), pseudonymizer).await?);

        let terms = AllowedTermCache::new(Arc::clone(&store));
        let validator = Arc::new(Validator::new(terms.clone()));
        let guardrail = GenerationGuardrail::new(
            generator,
            Arc::clone(&validator) as Arc<dyn StatementValidator>,
            terms.clone(),
            config.changes_graph.clone(),
            config.llm.clone(),
        );

        info!(
            graph = %config.changes_graph,
            auth = config.api_token.is_some(),
            pseudonymize = config.pseudonym.enabled,
            "mutation gateway ready"
        );

        Ok(Self {
            scoper: GraphScoper::new(config.changes_graph.clone()),
            confirmations: ConfirmationStore::new(config.confirm_ttl()),
            executor: MutationExecutor::new(Arc::clone(&store), audit),
            admission: AdmissionGate::new(config.admission),
            store,
            terms,
            validator,
            guardrail,
            perf,
            config,
        })
    }

    /// Gateway talking to Fuseki and an OpenAI-compatible endpoint
    ///
    /// # Errors
    ///
    /// Returns an error when an HTTP client cannot be built or the audit
    /// log cannot be opened.
    pub async fn connect(config: GatewayConfig) -> Result<Self, GatewayError> {
        let store = Arc::new(FusekiStore::new(config.store.clone())?);
        let generator = Arc::new(OpenAiGenerator::new(config.llm.clone())?);
        Self::new(config, store, generator).await
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Staged statements not yet consumed
    #[inline]
    #[must_use]
    pub fn pending_confirmations(&self) -> usize {
        self.confirmations.len()
    }

    fn authorize(&self, caller: &Caller) -> Result<(), GatewayError> {
        if let Some(expected) = &self.config.api_token {
            match caller.api_key.as_deref() {
                None => return Err(GatewayError::Unauthorized("API key missing.".to_string())),
                Some(key) if key != expected => {
                    warn!(origin = ?caller.origin, "invalid API key presented");
                    return Err(GatewayError::Unauthorized("API key invalid.".to_string()));
                }
                Some(_) => {}
            }
        }
        self.admission.admit(caller.identifier())
    }

    async fn analyse(&self, statement: &str) -> (ValidationResult, Explanation) {
        (self.validator.validate(statement).await, explain(statement))
    }

    /// Scope, analyse and stage an author-written statement
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotAMutation`] for statements that do not
    /// write, besides the auth and admission errors.
    pub async fn preview(&self, caller: &Caller, statement: &str) -> Result<Preview, GatewayError> {
        self.authorize(caller)?;
        if !is_mutation(statement) {
            return Err(GatewayError::NotAMutation);
        }
        let scoped = self.scoper.ensure_target_graph(statement);
        let (validation, explanation) = self.analyse(&scoped).await;
        Ok(self.stage(scoped, validation, explanation, None))
    }

    fn stage(
        &self,
        statement: String,
        validation: ValidationResult,
        explanation: Explanation,
        placeholders: Option<PlaceholderMap>,
    ) -> Preview {
        let token = self.confirmations.stage(StagedStatement {
            statement: statement.clone(),
            validation: validation.clone(),
            explanation: explanation.clone(),
            placeholders,
        });
        info!(kind = explanation.kind.as_str(), "statement staged for confirmation");
        Preview {
            token: Some(token),
            statement,
            validation,
            explanation,
        }
    }

    /// Generate a statement from free text and stage it when it writes
    ///
    /// Without an explicit `intent` one is guessed from the text.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::GuardrailRejection`] or
    /// [`GatewayError::Generation`] from the guardrail, besides the auth and
    /// admission errors.
    pub async fn generate(
        &self,
        caller: &Caller,
        free_text: &str,
        intent: Option<Intent>,
    ) -> Result<Generated, GatewayError> {
        self.authorize(caller)?;
        let intent = intent.unwrap_or_else(|| Intent::detect(free_text));
        let Draft {
            statement,
            validation,
            attempts,
            placeholders,
            ..
        } = self.guardrail.generate(free_text, Some(intent)).await?;

        let preview = if is_mutation(&statement) {
            let scoped = self.scoper.ensure_target_graph(&statement);
            let (validation, explanation) = self.analyse(&scoped).await;
            let map = (!placeholders.is_empty()).then(|| placeholders.clone());
            self.stage(scoped, validation, explanation, map)
        } else {
            debug!("generated statement does not write, not staged");
            Preview {
                token: None,
                explanation: explain(&statement),
                statement,
                validation,
            }
        };

        Ok(Generated {
            intent,
            attempts,
            placeholders,
            preview,
        })
    }

    /// Apply a staged statement
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TokenInvalid`] for unknown, consumed or
    /// expired tokens, and the executor's errors otherwise.
    pub async fn execute(
        &self,
        caller: &Caller,
        token: &str,
    ) -> Result<ExecutionOutcome, GatewayError> {
        self.authorize(caller)?;
        let pending = self
            .confirmations
            .consume(token)
            .ok_or(GatewayError::TokenInvalid)?;
        self.executor.execute(pending).await
    }

    /// Revert a previous write
    ///
    /// The undo text is scoped and analysed like any other write before it
    /// is sent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NothingToUndo`] when a record carries no undo
    /// statement or only a masked one, and the executor's errors otherwise.
    pub async fn undo(
        &self,
        caller: &Caller,
        source: UndoSource,
    ) -> Result<ExecutionOutcome, GatewayError> {
        self.authorize(caller)?;
        let statement = match source {
            UndoSource::Statement(text) => text,
            UndoSource::Record(record) => match record.undo_statement {
                Some(text) if !MASKED_LITERAL.is_match(&text) => text,
                Some(_) => {
                    warn!("audit record undo carries pseudonymized literals");
                    return Err(GatewayError::NothingToUndo);
                }
                None => return Err(GatewayError::NothingToUndo),
            },
        };
        if statement.trim().is_empty() {
            return Err(GatewayError::NothingToUndo);
        }

        let scoped = self.scoper.ensure_target_graph(&statement);
        let (validation, explanation) = self.analyse(&scoped).await;
        self.executor.undo(&scoped, validation, explanation).await
    }

    /// Run a read-only query
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] when the query fails.
    pub async fn select(&self, caller: &Caller, query: &str) -> Result<SelectResults, GatewayError> {
        self.authorize(caller)?;
        Ok(self.store.select(query).await?)
    }

    /// Most recent audit records, newest first
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Audit`] when the log cannot be read.
    pub async fn recent_audit(
        &self,
        caller: &Caller,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        self.authorize(caller)?;
        Ok(self.executor.audit().tail(limit).await?)
    }

    /// Check the audit hash chain, returning the number of records
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Audit`] on a broken chain.
    pub async fn verify_audit(&self, caller: &Caller) -> Result<usize, GatewayError> {
        self.authorize(caller)?;
        Ok(self.executor.audit().verify_integrity().await?)
    }

    /// Store latency over the last `minutes` minutes
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] when the performance log cannot be
    /// read.
    pub async fn perf_summary(
        &self,
        caller: &Caller,
        minutes: u32,
    ) -> Result<PerfSummary, GatewayError> {
        self.authorize(caller)?;
        match &self.perf {
            Some(perf) => Ok(perf.summary(minutes).await?),
            None => Ok(PerfSummary {
                window_minutes: minutes.clamp(1, MAX_WINDOW_MINUTES),
                operations: BTreeMap::new(),
            }),
        }
    }

    /// Cached allowed classes and properties
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] when nothing is cached yet and the
    /// store cannot be reached.
    pub async fn terms(&self, caller: &Caller) -> Result<Arc<TermSnapshot>, GatewayError> {
        self.authorize(caller)?;
        Ok(self.terms.get().await?)
    }

    /// Reload the allowed terms from the store
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`]; the previous snapshot stays active.
    pub async fn refresh_terms(&self, caller: &Caller) -> Result<Arc<TermSnapshot>, GatewayError> {
        self.authorize(caller)?;
        Ok(self.terms.refresh().await?)
    }

    /// Replace the admission policy at runtime
    ///
    /// # Errors
    ///
    /// Auth and admission errors only.
    pub fn reload_admission(
        &self,
        caller: &Caller,
        policy: AdmissionPolicy,
    ) -> Result<AdmissionPolicy, GatewayError> {
        self.authorize(caller)?;
        self.admission.configure(policy);
        let applied = self.admission.policy();
        info!(limit = applied.limit, burst = applied.burst, "admission policy reloaded");
        Ok(applied)
    }
}
