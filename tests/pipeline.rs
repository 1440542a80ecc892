//! End-to-end tests for the decision-and-merge pipeline.
//!
//! These exercise the full flow against real temp directories:
//! extraction, classification, translation via a scripted or HTTP-mocked
//! provider, validation, and the non-destructive merge.

use ai_translate::cache::{TranslationCache, DEFAULT_TTL};
use ai_translate::contract;
use ai_translate::extract::{
    self, ArtifactKind, Candidate, DataNature, Layer, Location, TranslationContext,
};
use ai_translate::memory::LanguageMemory;
use ai_translate::orchestrator::{Orchestrator, RunOptions};
use ai_translate::profile::ContextProfile;
use ai_translate::sink::MemorySink;
use ai_translate::storage::{EntryStatus, TranslationStore};
use ai_translate::translator::{LlmTranslator, MockMode, MockTranslator, Translator};
use ai_translate::ReasonCode;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ==================== Test Helpers ====================

fn label_candidate(text: &str) -> Candidate {
    Candidate {
        source_text: text.to_string(),
        layer: Layer::B,
        location: Location {
            artifact: "Records/test".to_string(),
            line: 0,
        },
        context: TranslationContext::field_of(
            Layer::B,
            ArtifactKind::DatabaseRecord,
            "Report",
            "label",
            DataNature::Label,
        ),
    }
}

fn run_options(dir: &Path) -> RunOptions {
    RunOptions {
        memory_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn orchestrator_with(
    dir: &TempDir,
    translator: Arc<dyn Translator>,
    memory: LanguageMemory,
) -> Orchestrator {
    let store = TranslationStore::open(dir.path(), "ar").unwrap();
    let cache = TranslationCache::new(&dir.path().join("cache"), DEFAULT_TTL);
    Orchestrator::new(
        translator,
        cache,
        store,
        memory,
        ContextProfile::new("testapp", Some("accounting suite")),
        run_options(dir.path()),
    )
}

// ==================== Core Scenarios ====================

#[tokio::test]
async fn test_label_flows_to_accepted_entry() {
    // "Create Invoice", layer B, no placeholders: classify → TRANSLATE
    // with empty safety contract → provider returns Arabic → validate
    // passes → merged with status accepted.
    let dir = tempfile::tempdir().unwrap();
    let mut map = HashMap::new();
    map.insert("Create Invoice".to_string(), "إنشاء فاتورة".to_string());
    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Mappings(map))),
        LanguageMemory::new("ar"),
    );

    let summary = orch.run(vec![label_candidate("Create Invoice")]).await.unwrap();

    assert_eq!(summary.translated, 1);
    assert_eq!(summary.rejected, 0);
    let entry = orch.store().get("Create Invoice").unwrap();
    assert_eq!(entry.translated_text, "إنشاء فاتورة");
    assert_eq!(entry.status, EntryStatus::Accepted);
}

#[tokio::test]
async fn test_lost_placeholder_marks_entry_rejected() {
    // "Please enter {0} before {1}" where the provider drops {1}:
    // validate fails → rejected with reason placeholder_mismatch.
    let dir = tempfile::tempdir().unwrap();
    let mut map = HashMap::new();
    map.insert(
        "Please enter {0} before {1}".to_string(),
        "الرجاء إدخال {0} قبل".to_string(),
    );
    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Mappings(map))),
        LanguageMemory::new("ar"),
    );

    let summary = orch
        .run(vec![label_candidate("Please enter {0} before {1}")])
        .await
        .unwrap();

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.ledger[0].reason, ReasonCode::PlaceholderMismatch);
    assert!(orch.store().is_empty());
}

#[tokio::test]
async fn test_unchanged_source_set_second_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = || {
        vec![
            label_candidate("Create Invoice"),
            label_candidate("Save Draft"),
            label_candidate("Submit Order"),
        ]
    };

    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Suffix)),
        LanguageMemory::new("ar"),
    );
    let first = orch.run(candidates()).await.unwrap();
    assert_eq!(first.merge.added, 3);

    let csv_after_first = std::fs::read(dir.path().join("ar.csv")).unwrap();

    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Suffix)),
        LanguageMemory::load(dir.path(), "ar").unwrap(),
    );
    let second = orch.run(candidates()).await.unwrap();

    assert_eq!(second.already_translated, 3);
    assert_eq!(second.translated, 0);
    assert_eq!(second.merge.changed(), 0);
    assert_eq!(
        std::fs::read(dir.path().join("ar.csv")).unwrap(),
        csv_after_first
    );
}

// ==================== Extraction to Merge ====================

#[tokio::test]
async fn test_full_pipeline_from_source_artifacts() {
    let app_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        app_dir.path().join("views.py"),
        r#"
title = _("Create Invoice")
internal = some_helper("not marked")
route = _("api_endpoint_v2")
"#,
    )
    .unwrap();
    std::fs::write(
        app_dir.path().join("workspace.json"),
        r#"{"doctype": "Workspace", "label": "Accounting Home"}"#,
    )
    .unwrap();
    std::fs::write(
        app_dir.path().join("home.html"),
        r#"<h1>{{ _("Welcome Back") }}</h1>"#,
    )
    .unwrap();

    let artifacts = extract::collect_artifacts(app_dir.path());
    assert_eq!(artifacts.len(), 3);
    let candidates = extract::extract_all(&artifacts);

    let store_dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_with(
        &store_dir,
        Arc::new(MockTranslator::new(MockMode::Suffix)),
        LanguageMemory::new("ar"),
    );
    let summary = orch.run(candidates).await.unwrap();

    // Three user-facing strings; the identifier-looking one is kept
    // original, and the unmarked call is never extracted.
    assert_eq!(summary.translated, 3);
    assert_eq!(summary.kept_original, 1);
    assert!(orch.store().contains("Create Invoice"));
    assert!(orch.store().contains("Welcome Back"));
    assert!(orch.store().contains("Accounting Home"));
    assert!(!orch.store().contains("api_endpoint_v2"));
    assert!(!orch.store().contains("not marked"));
}

// ==================== HTTP Provider End-to-End ====================

#[tokio::test]
async fn test_pipeline_with_llm_provider_over_http() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": "[\"إنشاء فاتورة\"]"}}
        ]
    });
    Mock::given(method("POST"))
        .and(url_path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let translator = LlmTranslator::new(
        &format!("{}/v1/chat/completions", server.uri()),
        "test-key",
        "gpt-4o-mini",
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_with(&dir, Arc::new(translator), LanguageMemory::new("ar"));

    let summary = orch.run(vec![label_candidate("Create Invoice")]).await.unwrap();
    assert_eq!(summary.translated, 1);
    assert_eq!(
        orch.store().get("Create Invoice").unwrap().translated_text,
        "إنشاء فاتورة"
    );
}

// ==================== Sink Integration ====================

#[tokio::test]
async fn test_accepted_results_reach_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(Mutex::new(MemorySink::new()));
    let store = TranslationStore::open(dir.path(), "ar").unwrap();
    let cache = TranslationCache::new(&dir.path().join("cache"), DEFAULT_TTL);
    let mut orch = Orchestrator::new(
        Arc::new(MockTranslator::new(MockMode::Suffix)),
        cache,
        store,
        LanguageMemory::new("ar"),
        ContextProfile::new("testapp", None),
        run_options(dir.path()),
    )
    .with_sink(Box::new(sink.clone()));

    orch.run(vec![
        label_candidate("Create Invoice"),
        label_candidate("   "),
    ])
    .await
    .unwrap();

    let records = sink.lock().unwrap();
    assert_eq!(records.records().len(), 1);
    assert_eq!(records.records()[0].source_text, "Create Invoice");
    assert_eq!(records.records()[0].language, "ar");
}

// ==================== Memory Across Runs ====================

#[tokio::test]
async fn test_terminology_learned_in_one_run_constrains_the_next() {
    let dir = tempfile::tempdir().unwrap();

    // Run 1 establishes "Customer" → "عميل" in memory.
    let mut map = HashMap::new();
    map.insert("Customer".to_string(), "عميل".to_string());
    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Mappings(map))),
        LanguageMemory::new("ar"),
    );
    let summary = orch.run(vec![label_candidate("Customer")]).await.unwrap();
    assert_eq!(summary.translated, 1);

    // Run 2 loads the persisted memory; a translation that ignores the
    // established term is flagged for review, not silently accepted.
    let memory = LanguageMemory::load(dir.path(), "ar").unwrap();
    assert_eq!(memory.lookup_term("Customer"), Some("عميل"));

    let mut map = HashMap::new();
    map.insert("Customer Name".to_string(), "اسم الزبون".to_string());
    let mut orch = orchestrator_with(
        &dir,
        Arc::new(MockTranslator::new(MockMode::Mappings(map))),
        memory,
    );
    let summary = orch.run(vec![label_candidate("Customer Name")]).await.unwrap();

    assert_eq!(summary.needs_review, 1);
    assert_eq!(
        orch.store().get("Customer Name").unwrap().status,
        EntryStatus::NeedsReview
    );
}

// ==================== Contract Assembly ====================

#[test]
fn test_contract_feeds_memory_into_prompts() {
    let mut memory = LanguageMemory::new("ar");
    memory.add_term("Invoice", "فاتورة");
    memory.record_accepted("Save Draft", "حفظ المسودة", "label", 0.95);
    let profile = ContextProfile::new("erpnext", Some("accounting suite"));

    let texts = vec!["Create Invoice now".to_string()];
    let contract = contract::build_contract(&memory, &profile, &texts, "label", "en", "ar");
    let prompt = contract.system_prompt();

    assert!(prompt.contains("Invoice → فاتورة"));
    assert!(prompt.contains("Save Draft → حفظ المسودة"));
    assert!(prompt.contains("accounting suite (erpnext)"));
}
