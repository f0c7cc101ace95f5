//! Generation guardrail
//!
//! Wraps the generation capability in a fixed instruction context, a
//! forbidden-keyword filter and a bounded retry: a draft that fails
//! validation gets exactly one corrective round, and the second result is
//! returned whatever it looks like.

use crate::error::GatewayError;
use crate::generation::{GenerationCapability, GenerationRequest, LlmConfig, Message};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sparqlgate_statement::{scrub, Intent, PlaceholderMap, ValidationResult, PREFIX_BLOCK, VOC_NAMESPACE};
use sparqlgate_store::{AllowedTermCache, StatementValidator};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Graph-management and federation keywords a draft may not contain
pub const FORBIDDEN_KEYWORDS: [&str; 8] = [
    "DROP", "LOAD", "CREATE", "CLEAR", "MOVE", "COPY", "ADD", "SERVICE",
];

/// Generation rounds per request
pub const MAX_ATTEMPTS: u32 = 2;

/// Classes listed in the instruction context
pub const CLASS_SAMPLE: usize = 150;

/// Properties listed in the instruction context
pub const PROPERTY_SAMPLE: usize = 200;

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```sparql\s*(.*?)```").expect("valid regex"));

/// A statement produced by the guardrail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Mirrors `validation.ok`
    pub ok: bool,
    /// Extracted statement, still carrying placeholders
    pub statement: String,
    /// Validation of the returned statement
    pub validation: ValidationResult,
    /// Generation rounds used
    pub attempts: u32,
    /// Literals hidden from the capability
    pub placeholders: PlaceholderMap,
}

/// Drives the generation capability safely
pub struct GenerationGuardrail {
    generator: Arc<dyn GenerationCapability>,
    validator: Arc<dyn StatementValidator>,
    terms: AllowedTermCache,
    graph: String,
    llm: LlmConfig,
}

impl std::fmt::Debug for GenerationGuardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGuardrail")
            .field("graph", &self.graph)
            .field("model", &self.llm.model)
            .finish_non_exhaustive()
    }
}

impl GenerationGuardrail {
    /// Guardrail over the given collaborators
    pub fn new(
        generator: Arc<dyn GenerationCapability>,
        validator: Arc<dyn StatementValidator>,
        terms: AllowedTermCache,
        graph: impl Into<String>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            generator,
            validator,
            terms,
            graph: graph.into(),
            llm,
        }
    }

    /// Turn free text into a validated draft
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::GuardrailRejection`] for a forbidden keyword
    /// and [`GatewayError::Generation`] when the capability fails. A reply
    /// without a usable statement is not an error: it yields a draft with an
    /// empty statement, which callers must not stage.
    pub async fn generate(
        &self,
        free_text: &str,
        intent: Option<Intent>,
    ) -> Result<Draft, GatewayError> {
        let snapshot = self.terms.get_or_empty().await;
        let classes: Vec<&str> = snapshot.classes.iter().take(CLASS_SAMPLE).map(String::as_str).collect();
        let properties: Vec<&str> = snapshot
            .properties
            .iter()
            .take(PROPERTY_SAMPLE)
            .map(String::as_str)
            .collect();

        let scrubbed = scrub(free_text);
        let user_text = match intent {
            Some(hint) => format!("[Intent={hint}] {}", scrubbed.text),
            None => scrubbed.text.clone(),
        };

        let mut messages = vec![Message::system(instructions(&classes, &properties, &self.graph))];
        for (request, reply) in worked_examples(&self.graph) {
            messages.push(Message::user(request));
            messages.push(Message::assistant(reply));
        }
        messages.push(Message::user(user_text));

        let mut attempts = 0;
        loop {
            attempts += 1;
            let reply = self.generator.generate(&self.request(&messages)).await?;
            let statement = extract_statement(&reply);
            screen(&statement)?;

            let validation = self.validator.validate(&statement).await;
            let acceptable = validation.ok && validation.errors.is_empty();
            if acceptable || attempts >= MAX_ATTEMPTS {
                info!(attempts, warnings = validation.warnings.len(), "draft generated");
                return Ok(Draft {
                    ok: validation.ok,
                    statement,
                    validation,
                    attempts,
                    placeholders: scrubbed.placeholders,
                });
            }

            debug!(errors = validation.errors.len(), "retrying generation with feedback");
            messages.push(Message::assistant(format!(
                "Previous draft:\n```sparql\n{statement}\n```"
            )));
            messages.push(Message::user(format!(
                "Correct it according to this feedback:\n{}\nReturn only one valid ```sparql``` code block.",
                feedback(&validation)
            )));
        }
    }

    fn request(&self, messages: &[Message]) -> GenerationRequest {
        GenerationRequest {
            messages: messages.to_vec(),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_output_tokens: self.llm.max_output_tokens,
        }
    }
}

/// Reject drafts carrying a forbidden keyword.
fn screen(statement: &str) -> Result<(), GatewayError> {
    match forbidden_keyword(statement) {
        Some(keyword) => {
            warn!(keyword, "draft contains a forbidden keyword");
            Err(GatewayError::GuardrailRejection {
                reason: format!("Disallowed keyword: {keyword}"),
                statement: statement.to_string(),
            })
        }
        None => Ok(()),
    }
}

/// First forbidden keyword found anywhere in the text, case-insensitively
#[must_use]
pub fn forbidden_keyword(statement: &str) -> Option<&'static str> {
    let upper = statement.to_uppercase();
    FORBIDDEN_KEYWORDS.iter().copied().find(|k| upper.contains(k))
}

/// Pull the statement out of a reply
///
/// A fenced `sparql` block wins; otherwise the whole reply is taken when it
/// mentions an update or selection keyword; otherwise nothing.
#[must_use]
pub fn extract_statement(reply: &str) -> String {
    if let Some(caps) = CODE_BLOCK.captures(reply) {
        return caps[1].trim().to_string();
    }
    let body = reply.trim();
    let upper = body.to_uppercase();
    if ["INSERT", "DELETE", "SELECT", "UPDATE"]
        .iter()
        .any(|k| upper.contains(k))
    {
        body.to_string()
    } else {
        String::new()
    }
}

/// Error lines first, then warning lines
fn feedback(validation: &ValidationResult) -> String {
    let lines: Vec<String> = validation
        .errors
        .iter()
        .map(|e| format!("Error: {e}"))
        .chain(validation.warnings.iter().map(|w| format!("Warning: {w}")))
        .collect();
    if lines.is_empty() {
        "No errors or warnings; stay within the vocabulary.".to_string()
    } else {
        lines.join("\n")
    }
}

fn shorten(iri: &str) -> String {
    iri.replace(VOC_NAMESPACE, "voc:")
}

fn instructions(classes: &[&str], properties: &[&str], graph: &str) -> String {
    let list = |terms: &[&str]| {
        if terms.is_empty() {
            "(none)".to_string()
        } else {
            terms.iter().map(|t| shorten(t)).collect::<Vec<_>>().join(", ")
        }
    };
    let forbidden = FORBIDDEN_KEYWORDS.join(", ");

    format!(
        "You are a strict SPARQL generator for Apache Jena Fuseki.
Rules:
- Output ONLY one ```sparql ...``` code block, no prose.
- Use EXACTLY these prefixes and no others:
{PREFIX_BLOCK}
- Use only classes and properties from the vocabulary below.
- Never use graph management or federation keywords ({forbidden}).
- IMPORTANT: write ALL updates into the named graph <{graph}>, e.g.
  INSERT DATA {{ GRAPH <{graph}> {{ ... }} }}
  DELETE DATA {{ GRAPH <{graph}> {{ ... }} }}
  WITH <{graph}> DELETE {{ ... }} INSERT {{ ... }} WHERE {{ ... }}
- Tokens such as PH1 stand for literals the user wrote; keep them as quoted literals (\"PH1\").
- For concrete people, places or dates use placeholder IRIs (<urn:example:...>) or variables bound in WHERE.

Allowed classes (excerpt): {}
Allowed properties (excerpt): {}
",
        list(classes),
        list(properties),
    )
}

fn worked_examples(graph: &str) -> [(String, String); 4] {
    [
        (
            "Add a new pastor with given name \"Max\" and surname \"Mustermann\".".to_string(),
            format!(
                "```sparql
{PREFIX_BLOCK}

INSERT DATA {{
  GRAPH <{graph}> {{
    <urn:example:person:NEW> a voc:Pfarrer-in ;
        voc:vorname \"Max\" ;
        voc:nachname \"Mustermann\" .
  }}
}}
```"
            ),
        ),
        (
            "Change the surname of this person IRI to \"Schmidt\".".to_string(),
            format!(
                "```sparql
{PREFIX_BLOCK}

WITH <{graph}>
DELETE {{ <urn:example:person:TARGET> voc:nachname ?old . }}
INSERT {{ <urn:example:person:TARGET> voc:nachname \"Schmidt\" . }}
WHERE  {{ <urn:example:person:TARGET> voc:nachname ?old . }}
```"
            ),
        ),
        (
            "Remove a person's parish position assignment.".to_string(),
            format!(
                "```sparql
{PREFIX_BLOCK}

DELETE DATA {{
  GRAPH <{graph}> {{
    <urn:example:person:TARGET> voc:hatStelle <urn:example:stelle:ID> .
  }}
}}
```"
            ),
        ),
        (
            "Show all pastors with given name and surname.".to_string(),
            format!(
                "```sparql
{PREFIX_BLOCK}

SELECT ?person ?given ?surname WHERE {{
  ?person a voc:Pfarrer-in ;
          voc:vorname ?given ;
          voc:nachname ?surname .
}} LIMIT 20
```"
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generation::{MockGenerationCapability, Role};
    use async_trait::async_trait;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use sparqlgate_statement::check;
    use sparqlgate_store::{SelectResults, StoreError, TripleStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    const GRAPH: &str = "urn:test:changes";

    struct EmptySchema;

    #[async_trait]
    impl TripleStore for EmptySchema {
        async fn select(&self, _query: &str) -> Result<SelectResults, StoreError> {
            Ok(SelectResults::default())
        }

        async fn update(&self, _update: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Fails the first validation with an error, passes afterwards.
    #[derive(Default)]
    struct StrictOnce {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StatementValidator for StrictOnce {
        async fn validate(&self, statement: &str) -> ValidationResult {
            let mut result = check(statement, &Default::default());
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                result.ok = false;
                result.errors.push("Unknown class: <urn:x>".to_string());
            }
            result
        }
    }

    struct Lenient;

    #[async_trait]
    impl StatementValidator for Lenient {
        async fn validate(&self, statement: &str) -> ValidationResult {
            check(statement, &Default::default())
        }
    }

    fn guardrail(
        generator: MockGenerationCapability,
        validator: Arc<dyn StatementValidator>,
    ) -> GenerationGuardrail {
        GenerationGuardrail::new(
            Arc::new(generator),
            validator,
            AllowedTermCache::new(Arc::new(EmptySchema)),
            GRAPH,
            LlmConfig::default(),
        )
    }

    fn fenced(statement: &str) -> String {
        format!("Here you go:\n```sparql\n{statement}\n```\n")
    }

    #[test]
    fn extracts_fenced_block_or_raw_statement() {
        assert_eq!(
            extract_statement("```SPARQL\nINSERT DATA { }\n```"),
            "INSERT DATA { }"
        );
        assert_eq!(extract_statement("  SELECT * WHERE { ?s ?p ?o } "), "SELECT * WHERE { ?s ?p ?o }");
        assert_eq!(extract_statement("I cannot help with that."), "");
    }

    #[test]
    fn forbidden_keywords_are_found_case_insensitively() {
        assert_eq!(forbidden_keyword("drop graph <urn:g>"), Some("DROP"));
        assert_eq!(forbidden_keyword("SELECT * { SERVICE <x> {} }"), Some("SERVICE"));
        assert_eq!(forbidden_keyword("INSERT DATA { }"), None);
    }

    #[test]
    fn feedback_lists_errors_before_warnings() {
        let mut v = check("hello", &Default::default());
        v.errors.push("bad".to_string());
        assert_eq!(
            feedback(&v),
            "Error: bad\nWarning: Statement contains no recognisable SPARQL update or query keywords."
        );
    }

    #[tokio::test]
    async fn accepted_on_first_attempt_with_scrubbed_hinted_text() {
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .times(1)
            .withf(|req: &GenerationRequest| {
                let last = req.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
                req.messages[0].role == Role::System
                    && req.messages.len() == 10
                    && last == "[Intent=insert] Add a pastor named PH1"
            })
            .returning(|_| Ok(fenced("INSERT DATA { <urn:p> <urn:given> \"PH1\" . }")));

        let draft = guardrail(generator, Arc::new(Lenient))
            .generate("Add a pastor named \"Anna\"", Some(Intent::Insert))
            .await
            .unwrap();

        assert!(draft.ok);
        assert_eq!(draft.attempts, 1);
        assert_eq!(draft.statement, "INSERT DATA { <urn:p> <urn:given> \"PH1\" . }");
        assert_eq!(draft.placeholders.get("PH1"), Some("Anna"));
    }

    #[tokio::test]
    async fn forbidden_keyword_rejects_without_validation() {
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok(fenced("DROP GRAPH <urn:g>")));
        let validator = Arc::new(StrictOnce::default());

        let err = guardrail(generator, validator.clone())
            .generate("wipe everything", None)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::GuardrailRejection { ref reason, .. } if reason.contains("DROP")));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prose_reply_yields_an_empty_draft() {
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok("Sorry, I do not know.".to_string()));

        let draft = guardrail(generator, Arc::new(Lenient))
            .generate("something", None)
            .await
            .unwrap();

        assert!(draft.ok);
        assert_eq!(draft.attempts, 1);
        assert_eq!(draft.statement, "");
        assert_eq!(draft.validation.warnings.len(), 1);
    }

    #[tokio::test]
    async fn prose_in_the_corrective_round_is_returned_as_is() {
        let mut seq = Sequence::new();
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(fenced("INSERT DATA { <urn:a> a <urn:x> . }")));
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("I am unable to correct this statement.".to_string()));

        let draft = guardrail(generator, Arc::new(StrictOnce::default()))
            .generate("insert something", None)
            .await
            .unwrap();

        assert_eq!(draft.attempts, 2);
        assert_eq!(draft.statement, "");
        assert!(draft.validation.errors.is_empty());
    }

    #[tokio::test]
    async fn invalid_draft_gets_exactly_one_corrective_round() {
        let mut seq = Sequence::new();
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(fenced("INSERT DATA { <urn:a> a <urn:x> . }")));
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &GenerationRequest| {
                let n = req.messages.len();
                req.messages[n - 2].role == Role::Assistant
                    && req.messages[n - 2].content.contains("Previous draft")
                    && req.messages[n - 1].content.contains("Error: Unknown class: <urn:x>")
            })
            .returning(|_| Ok(fenced("INSERT DATA { <urn:a> <urn:p> 1 . }")));

        let draft = guardrail(generator, Arc::new(StrictOnce::default()))
            .generate("insert something", None)
            .await
            .unwrap();

        assert_eq!(draft.attempts, 2);
        assert_eq!(draft.statement, "INSERT DATA { <urn:a> <urn:p> 1 . }");
    }

    #[tokio::test]
    async fn capability_failure_propagates() {
        let mut generator = MockGenerationCapability::new();
        generator
            .expect_generate()
            .returning(|_| Err(GenerationError::Network("timeout".to_string())));

        let err = guardrail(generator, Arc::new(Lenient))
            .generate("insert", None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn instructions_carry_prefixes_graph_and_forbidden_list() {
        let text = instructions(&[], &["http://meta-pfarrerbuch.evangelische-archive.de/vocabulary#vorname"], GRAPH);
        assert!(text.contains(PREFIX_BLOCK));
        assert!(text.contains("<urn:test:changes>"));
        assert!(text.contains("DROP, LOAD, CREATE, CLEAR, MOVE, COPY, ADD, SERVICE"));
        assert!(text.contains("Allowed classes (excerpt): (none)"));
        assert!(text.contains("voc:vorname"));
    }
}
