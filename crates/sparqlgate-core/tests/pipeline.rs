//! End-to-end runs of the gateway against in-memory collaborators

use pretty_assertions::assert_eq;
use sparqlgate_audit::AuditStatus;
use sparqlgate_audit::PseudonymConfig;
use sparqlgate_core::prelude::*;
use sparqlgate_core::Role;
use sparqlgate_statement::PREFIX_BLOCK;
use sparqlgate_store::{RdfTerm, SelectResults};
use sparqlgate_test_utils::{test_config, voc, FakeStore, ScriptedGenerator};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    store: Arc<FakeStore>,
    generator: Arc<ScriptedGenerator>,
    gateway: MutationGateway,
}

async fn harness_with(
    configure: impl FnOnce(GatewayConfig) -> GatewayConfig,
    store: FakeStore,
    generator: ScriptedGenerator,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = configure(test_config(dir.path()));
    let store = Arc::new(store);
    let generator = Arc::new(generator);
    let gateway = MutationGateway::new(config, store.clone(), generator.clone())
        .await
        .unwrap();
    Harness {
        _dir: dir,
        store,
        generator,
        gateway,
    }
}

async fn harness(generator: ScriptedGenerator) -> Harness {
    harness_with(|c| c, FakeStore::with_vocabulary(), generator).await
}

fn caller() -> Caller {
    Caller::new().with_origin("127.0.0.1")
}

#[tokio::test]
async fn preview_then_execute_writes_scoped_statement_and_audits() {
    let h = harness(ScriptedGenerator::new()).await;

    let preview = h
        .gateway
        .preview(&caller(), "INSERT DATA { <urn:a> <urn:p> 1 . }")
        .await
        .unwrap();
    assert_eq!(
        preview.statement,
        "INSERT DATA { GRAPH <urn:test:changes> { <urn:a> <urn:p> 1 . } }"
    );
    assert!(preview.validation.ok);
    assert_eq!(preview.explanation.kind.as_str(), "INSERT DATA");
    assert!(h.store.updates().is_empty());

    let token = preview.token.unwrap();
    let outcome = h.gateway.execute(&caller(), &token).await.unwrap();

    assert_eq!(h.store.updates(), vec![preview.statement.clone()]);
    assert_eq!(
        outcome.undo_statement.as_deref(),
        Some("DELETE DATA { GRAPH <urn:test:changes> { <urn:a> <urn:p> 1 . } }")
    );

    let records = h.gateway.recent_audit(&caller(), 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Applied);
    assert_eq!(h.gateway.verify_audit(&caller()).await.unwrap(), 1);
}

#[tokio::test]
async fn tokens_are_single_use() {
    let h = harness(ScriptedGenerator::new()).await;
    let token = h
        .gateway
        .preview(&caller(), "INSERT DATA { <urn:a> <urn:p> 1 . }")
        .await
        .unwrap()
        .token
        .unwrap();

    h.gateway.execute(&caller(), &token).await.unwrap();
    let again = h.gateway.execute(&caller(), &token).await.unwrap_err();

    assert!(matches!(again, GatewayError::TokenInvalid));
    assert_eq!(h.store.updates().len(), 1);
    assert_eq!(h.gateway.pending_confirmations(), 0);
}

#[tokio::test]
async fn preview_refuses_reads() {
    let h = harness(ScriptedGenerator::new()).await;
    let err = h
        .gateway
        .preview(&caller(), "SELECT * WHERE { ?s ?p ?o }")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotAMutation));
    assert_eq!(h.gateway.pending_confirmations(), 0);
}

#[tokio::test]
async fn generated_literals_never_leave_the_process_or_reach_the_log() {
    let statement = format!(
        "{PREFIX_BLOCK}\n\nINSERT DATA {{\n  GRAPH <urn:test:changes> {{\n    <urn:example:person:NEW> a voc:Pfarrer-in ;\n        voc:vorname \"PH1\" .\n  }}\n}}"
    );
    let h = harness(ScriptedGenerator::new().reply_statement(&statement)).await;

    let generated = h
        .gateway
        .generate(&caller(), "Add a pastor with given name \"Anna\"", None)
        .await
        .unwrap();

    assert_eq!(generated.intent, Intent::Insert);
    assert_eq!(generated.attempts, 1);
    assert_eq!(generated.placeholders.get("PH1"), Some("Anna"));

    let requests = h.generator.requests();
    assert_eq!(requests.len(), 1);
    let last = requests[0].messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "[Intent=insert] Add a pastor with given name PH1");
    assert!(requests[0].messages.iter().all(|m| !m.content.contains("Anna")));

    let token = generated.preview.token.unwrap();
    let outcome = h.gateway.execute(&caller(), &token).await.unwrap();

    let sent = h.store.updates();
    assert!(sent[0].contains("voc:vorname \"Anna\""));
    assert!(outcome.undo_statement.unwrap().contains("\"Anna\""));

    let log = std::fs::read_to_string(h.gateway.config().audit_log_file.clone()).unwrap();
    assert!(!log.contains("Anna"));
    assert!(log.contains("px-"));
}

#[tokio::test]
async fn forbidden_keyword_stops_before_store_and_audit() {
    let h = harness(ScriptedGenerator::new().reply_statement("DROP GRAPH <urn:test:changes>")).await;

    let err = h
        .gateway
        .generate(&caller(), "delete the whole graph", None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::GuardrailRejection { .. }));
    assert_eq!(h.gateway.pending_confirmations(), 0);
    assert!(h.store.updates().is_empty());
    assert!(h.gateway.recent_audit(&caller(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn generated_read_is_not_staged() {
    let h = harness(
        ScriptedGenerator::new()
            .reply_statement("SELECT ?p WHERE { ?p a voc:Pfarrer-in } LIMIT 20"),
    )
    .await;

    let generated = h
        .gateway
        .generate(&caller(), "show all pastors", Some(Intent::Select))
        .await
        .unwrap();

    assert!(generated.preview.token.is_none());
    assert_eq!(h.gateway.pending_confirmations(), 0);
}

#[tokio::test]
async fn reply_without_statement_is_not_staged() {
    let h = harness(ScriptedGenerator::new().reply("I cannot produce a statement for that.")).await;

    let generated = h
        .gateway
        .generate(&caller(), "add a pastor", Some(Intent::Insert))
        .await
        .unwrap();

    assert_eq!(generated.attempts, 1);
    assert_eq!(generated.preview.statement, "");
    assert!(generated.preview.token.is_none());
    assert_eq!(h.gateway.pending_confirmations(), 0);
    assert!(h.store.updates().is_empty());
}

#[tokio::test]
async fn store_failure_is_audited_and_surfaced() {
    let h = harness(ScriptedGenerator::new()).await;
    let token = h
        .gateway
        .preview(&caller(), "INSERT DATA { <urn:a> <urn:p> 1 . }")
        .await
        .unwrap()
        .token
        .unwrap();
    h.store.fail_updates(true);

    let err = h.gateway.execute(&caller(), &token).await.unwrap_err();

    assert!(err.to_string().contains("Lexical error"));
    let records = h.gateway.recent_audit(&caller(), 10).await.unwrap();
    assert_eq!(records[0].status, AuditStatus::Failed);
    assert!(records[0].undo_statement.is_none());
}

#[tokio::test]
async fn undo_from_audit_record_reverts_the_write() {
    let h = harness_with(
        |c| {
            c.with_pseudonym(PseudonymConfig {
                enabled: false,
                ..PseudonymConfig::default()
            })
        },
        FakeStore::with_vocabulary(),
        ScriptedGenerator::new(),
    )
    .await;
    let statement = format!("{PREFIX_BLOCK}\nINSERT DATA {{ <urn:p> voc:vorname \"Anna\" . }}");
    let token = h.gateway.preview(&caller(), &statement).await.unwrap().token.unwrap();
    h.gateway.execute(&caller(), &token).await.unwrap();

    let record = h.gateway.recent_audit(&caller(), 1).await.unwrap().remove(0);
    let outcome = h
        .gateway
        .undo(&caller(), UndoSource::Record(Box::new(record)))
        .await
        .unwrap();

    assert!(outcome.undo_statement.is_none());
    let updates = h.store.updates();
    assert_eq!(updates.len(), 2);
    assert!(updates[1].contains("DELETE DATA"));
    assert!(updates[1].contains("GRAPH <urn:test:changes>"));

    let records = h.gateway.recent_audit(&caller(), 10).await.unwrap();
    assert_eq!(records[0].status, AuditStatus::UndoApplied);
    assert_eq!(h.gateway.verify_audit(&caller()).await.unwrap(), 2);
}

#[tokio::test]
async fn masked_record_undo_is_unusable() {
    let h = harness(ScriptedGenerator::new()).await;
    let statement = format!("{PREFIX_BLOCK}\nINSERT DATA {{ <urn:p> voc:vorname \"Anna\" . }}");
    let token = h.gateway.preview(&caller(), &statement).await.unwrap().token.unwrap();
    let outcome = h.gateway.execute(&caller(), &token).await.unwrap();

    let record = h.gateway.recent_audit(&caller(), 1).await.unwrap().remove(0);
    let err = h
        .gateway
        .undo(&caller(), UndoSource::Record(Box::new(record)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NothingToUndo));

    // The clear-text undo handed back at execution still works.
    let undo = outcome.undo_statement.unwrap();
    h.gateway
        .undo(&caller(), UndoSource::Statement(undo))
        .await
        .unwrap();
    assert_eq!(h.store.updates().len(), 2);
}

#[tokio::test]
async fn api_key_is_required_when_configured() {
    let h = harness_with(
        |c| c.with_api_token("s3cret"),
        FakeStore::with_vocabulary(),
        ScriptedGenerator::new(),
    )
    .await;

    let missing = h.gateway.recent_audit(&caller(), 5).await.unwrap_err();
    assert_eq!(missing.to_string(), "API key missing.");

    let wrong = h
        .gateway
        .recent_audit(&Caller::from_headers(Some("nope"), None, None), 5)
        .await
        .unwrap_err();
    assert_eq!(wrong.to_string(), "API key invalid.");

    let ok = Caller::from_headers(None, Some("Bearer s3cret"), None);
    assert!(h.gateway.recent_audit(&ok, 5).await.is_ok());
}

#[tokio::test]
async fn admission_is_enforced_and_reconfigurable() {
    let h = harness_with(
        |c| c.with_admission(AdmissionPolicy::new(1, 0)),
        FakeStore::with_vocabulary(),
        ScriptedGenerator::new(),
    )
    .await;
    let busy = Caller::new().with_origin("10.0.0.7");

    h.gateway.recent_audit(&busy, 1).await.unwrap();
    let denied = h.gateway.recent_audit(&busy, 1).await.unwrap_err();
    assert!(matches!(denied, GatewayError::AdmissionDenied { .. }));
    assert!(denied.is_retryable());

    let admin = Caller::new().with_origin("10.0.0.1");
    let applied = h
        .gateway
        .reload_admission(&admin, AdmissionPolicy::new(5, 0))
        .unwrap();
    assert_eq!(applied.limit, 5);
    assert!(h.gateway.recent_audit(&busy, 1).await.is_ok());
}

#[tokio::test]
async fn select_passes_results_through() {
    let canned = SelectResults::from_column("p", [RdfTerm::uri("urn:example:person:1")]);
    let h = harness_with(
        |c| c,
        FakeStore::with_vocabulary().with_select_results(canned.clone()),
        ScriptedGenerator::new(),
    )
    .await;

    let results = h
        .gateway
        .select(&caller(), "SELECT ?p WHERE { ?p a ?c }")
        .await
        .unwrap();
    assert_eq!(results, canned);
    assert_eq!(results.column("p"), vec!["urn:example:person:1"]);
}

#[tokio::test]
async fn terms_survive_a_failed_refresh() {
    let h = harness(ScriptedGenerator::new()).await;

    let terms = h.gateway.terms(&caller()).await.unwrap();
    assert!(terms.classes.contains(&voc("Pfarrer-in")));
    assert_eq!(terms.properties.len(), 3);

    h.store.fail_selects(true);
    let err = h.gateway.refresh_terms(&caller()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(_)));

    let still = h.gateway.terms(&caller()).await.unwrap();
    assert_eq!(still, terms);
}

#[tokio::test]
async fn perf_summary_counts_store_calls() {
    let h = harness(ScriptedGenerator::new()).await;
    let token = h
        .gateway
        .preview(&caller(), "INSERT DATA { <urn:a> <urn:p> 1 . }")
        .await
        .unwrap()
        .token
        .unwrap();
    h.gateway.execute(&caller(), &token).await.unwrap();

    let summary = h.gateway.perf_summary(&caller(), 0).await.unwrap();
    assert_eq!(summary.window_minutes, 1);
    assert_eq!(summary.operations["update"].n, 1);
    assert_eq!(summary.operations["select"].n, 2);
}
