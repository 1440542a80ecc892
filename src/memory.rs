//! Language memory: per-target-language terminology, style and example
//! accumulator.
//!
//! One instance exists per target language, loaded at run start from a
//! JSON document and written back atomically at run end. During a run the
//! contract builder reads it; mutations happen only at batch-commit time.
//! The terminology map enforces one preferred translation per source term:
//! a new accepted translation that disagrees with the stored preference is
//! flagged as a conflict instead of silently overwriting memory, so that
//! consistency changes always pass through human review.

use crate::extract::{Layer, TranslationContext};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bound on the rolling example list; oldest pairs are evicted first.
pub const MAX_EXAMPLE_PAIRS: usize = 50;

/// An accepted (source, translation) pair kept as few-shot context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplePair {
    pub source: String,
    pub translated: String,
    /// UI kind the pair came from: "button", "label" or "paragraph".
    pub context_kind: String,
    pub confidence: f32,
}

/// Outcome of recording an accepted translation against memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermRecord {
    /// Term stored, or the text was not term-like.
    Stored,
    /// The stored preference already says the same thing.
    AlreadyConsistent,
    /// Memory holds a different preferred translation for this term.
    Conflict { existing: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageMemory {
    pub lang: String,
    terminology: BTreeMap<String, String>,
    style_profile: BTreeMap<String, String>,
    example_pairs: VecDeque<ExamplePair>,
}

impl LanguageMemory {
    pub fn new(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            terminology: BTreeMap::new(),
            style_profile: BTreeMap::new(),
            example_pairs: VecDeque::new(),
        }
    }

    fn document_path(dir: &Path, lang: &str) -> PathBuf {
        dir.join(format!("{}_memory.json", lang))
    }

    /// Load the memory document for a language, or start empty when none
    /// has been written yet.
    pub fn load(dir: &Path, lang: &str) -> Result<Self> {
        let path = Self::document_path(dir, lang);
        if !path.exists() {
            return Ok(Self::new(lang));
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read language memory {}", path.display()))?;
        let memory: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse language memory {}", path.display()))?;
        Ok(memory)
    }

    /// Persist the document atomically: serialize to a sibling temp file,
    /// then rename over the target so readers never observe a torn write.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create memory directory {}", dir.display()))?;
        let path = Self::document_path(dir, &self.lang);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self).context("Failed to serialize memory")?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to commit {}", path.display()))?;
        debug!("Saved language memory for {}", self.lang);
        Ok(())
    }

    pub fn lookup_term(&self, term: &str) -> Option<&str> {
        self.terminology.get(term).map(String::as_str)
    }

    /// Force a terminology preference, e.g. from an explicit approval.
    pub fn add_term(&mut self, source: &str, translated: &str) {
        self.terminology
            .insert(source.to_string(), translated.to_string());
    }

    pub fn terminology(&self) -> &BTreeMap<String, String> {
        &self.terminology
    }

    /// Record an accepted translation: reconcile it with the terminology
    /// map and push it onto the bounded example list. A disagreement with
    /// the stored preference is reported instead of applied, and the
    /// conflicting pair stays out of the example list so it cannot bias
    /// later prompts before a human confirms it.
    pub fn record_accepted(
        &mut self,
        source: &str,
        translated: &str,
        context_kind: &str,
        confidence: f32,
    ) -> TermRecord {
        if let Some(existing) = self.terminology.get(source) {
            if existing != translated {
                return TermRecord::Conflict {
                    existing: existing.clone(),
                };
            }
            self.push_example(source, translated, context_kind, confidence);
            return TermRecord::AlreadyConsistent;
        }

        if is_term_like(source) {
            self.terminology
                .insert(source.to_string(), translated.to_string());
        }
        self.push_example(source, translated, context_kind, confidence);
        TermRecord::Stored
    }

    fn push_example(&mut self, source: &str, translated: &str, context_kind: &str, confidence: f32) {
        // A newer acceptance for the same source replaces the older pair.
        self.example_pairs.retain(|pair| pair.source != source);
        self.example_pairs.push_back(ExamplePair {
            source: source.to_string(),
            translated: translated.to_string(),
            context_kind: context_kind.to_string(),
            confidence,
        });
        while self.example_pairs.len() > MAX_EXAMPLE_PAIRS {
            self.example_pairs.pop_front();
        }
    }

    /// Check a finished translation against terminology: every known term
    /// appearing in the source must surface as its preferred translation.
    /// Returns the violated expectation, if any.
    pub fn check_consistency(&self, source: &str, translated: &str) -> Option<String> {
        let translated_lower = translated.to_lowercase();
        for word in source.split_whitespace() {
            let clean = word.trim_matches(|c: char| ".,!?;:".contains(c));
            if clean.is_empty() {
                continue;
            }
            if let Some(expected) = self.terminology.get(clean) {
                if !translated_lower.contains(&expected.to_lowercase()) {
                    return Some(format!(
                        "term '{}' should be translated as '{}'",
                        clean, expected
                    ));
                }
            }
        }
        None
    }

    /// Style descriptor for a context kind; neutral unless learned.
    pub fn style_for(&self, context_kind: &str) -> &str {
        self.style_profile
            .get(context_kind)
            .map(String::as_str)
            .unwrap_or("neutral")
    }

    pub fn set_style(&mut self, context_kind: &str, style: &str) {
        self.style_profile
            .insert(context_kind.to_string(), style.to_string());
    }

    /// Recent example pairs, optionally filtered by context kind, newest
    /// last, capped at `limit`.
    pub fn examples_for(&self, context_kind: Option<&str>, limit: usize) -> Vec<&ExamplePair> {
        self.example_pairs
            .iter()
            .filter(|pair| context_kind.map_or(true, |kind| pair.context_kind == kind))
            .rev()
            .take(limit)
            .collect()
    }

    pub fn example_count(&self) -> usize {
        self.example_pairs.len()
    }
}

/// A short capitalized phrase behaves like domain terminology ("Sales
/// Invoice", "Workspace"); longer prose does not.
fn is_term_like(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    !words.is_empty()
        && words.len() <= 3
        && text.len() <= 40
        && words
            .iter()
            .all(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
}

/// Map a candidate's structural context to the coarse UI kind used for
/// style and example grouping.
pub fn context_kind(context: &TranslationContext) -> &'static str {
    if let Some(field) = context.field.as_deref() {
        let field = field.to_lowercase();
        if field.contains("button") || field.contains("action") {
            return "button";
        }
        if field.contains("label") || field.contains("title") {
            return "label";
        }
        if field.contains("description") || field.contains("content") || field.contains("message") {
            return "paragraph";
        }
    }
    match context.layer {
        Layer::A | Layer::B => "label",
        Layer::C => "paragraph",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ArtifactKind, DataNature};

    // ==================== Recording Tests ====================

    #[test]
    fn test_record_accepted_stores_term() {
        let mut memory = LanguageMemory::new("ar");
        let outcome = memory.record_accepted("Customer", "عميل", "label", 0.95);
        assert_eq!(outcome, TermRecord::Stored);
        assert_eq!(memory.lookup_term("Customer"), Some("عميل"));
        assert_eq!(memory.example_count(), 1);
    }

    #[test]
    fn test_conflicting_term_is_flagged_not_overwritten() {
        let mut memory = LanguageMemory::new("ar");
        memory.add_term("Customer", "عميل");

        let outcome = memory.record_accepted("Customer", "زبون", "label", 0.95);
        assert_eq!(
            outcome,
            TermRecord::Conflict {
                existing: "عميل".to_string()
            }
        );
        // Memory keeps the stored preference, and the conflicting pair
        // does not enter the example list.
        assert_eq!(memory.lookup_term("Customer"), Some("عميل"));
        assert_eq!(memory.example_count(), 0);
    }

    #[test]
    fn test_reaffirming_term_is_consistent() {
        let mut memory = LanguageMemory::new("ar");
        memory.add_term("Customer", "عميل");
        let outcome = memory.record_accepted("Customer", "عميل", "label", 0.95);
        assert_eq!(outcome, TermRecord::AlreadyConsistent);
    }

    #[test]
    fn test_prose_is_not_terminology() {
        let mut memory = LanguageMemory::new("ar");
        memory.record_accepted(
            "Please save your changes before leaving",
            "يرجى حفظ التغييرات قبل المغادرة",
            "paragraph",
            0.95,
        );
        assert!(memory.lookup_term("Please save your changes before leaving").is_none());
        assert_eq!(memory.example_count(), 1);
    }

    // ==================== Example Bound Tests ====================

    #[test]
    fn test_example_pairs_are_bounded_oldest_evicted() {
        let mut memory = LanguageMemory::new("de");
        for i in 0..(MAX_EXAMPLE_PAIRS + 10) {
            memory.record_accepted(
                &format!("source text number {}", i),
                &format!("übersetzung {}", i),
                "label",
                0.9,
            );
        }
        assert_eq!(memory.example_count(), MAX_EXAMPLE_PAIRS);
        let examples = memory.examples_for(None, MAX_EXAMPLE_PAIRS);
        // The earliest pairs are gone.
        assert!(!examples.iter().any(|p| p.source.ends_with("number 0")));
        assert!(examples.iter().any(|p| p
            .source
            .ends_with(&format!("number {}", MAX_EXAMPLE_PAIRS + 9))));
    }

    #[test]
    fn test_same_source_replaces_older_example() {
        let mut memory = LanguageMemory::new("de");
        memory.record_accepted("greeting text here", "hallo", "label", 0.9);
        memory.record_accepted("greeting text here", "guten tag", "label", 0.9);
        assert_eq!(memory.example_count(), 1);
        assert_eq!(memory.examples_for(None, 5)[0].translated, "guten tag");
    }

    #[test]
    fn test_examples_filtered_by_kind() {
        let mut memory = LanguageMemory::new("ar");
        memory.record_accepted("Save order now", "احفظ الطلب", "button", 0.9);
        memory.record_accepted("Order summary text", "ملخص الطلب", "paragraph", 0.9);

        let buttons = memory.examples_for(Some("button"), 5);
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].source, "Save order now");
    }

    // ==================== Consistency Tests ====================

    #[test]
    fn test_consistency_detects_missing_term() {
        let mut memory = LanguageMemory::new("ar");
        memory.add_term("Invoice", "فاتورة");

        assert!(memory
            .check_consistency("Create Invoice now", "أنشئ فاتورة الآن")
            .is_none());
        let violation = memory
            .check_consistency("Create Invoice now", "أنشئ الآن")
            .expect("violation expected");
        assert!(violation.contains("Invoice"));
    }

    #[test]
    fn test_consistency_strips_punctuation() {
        let mut memory = LanguageMemory::new("ar");
        memory.add_term("Invoice", "فاتورة");
        assert!(memory
            .check_consistency("Save the Invoice.", "احفظ الفاتورة")
            .is_none());
    }

    // ==================== Style Tests ====================

    #[test]
    fn test_style_defaults_to_neutral() {
        let memory = LanguageMemory::new("fr");
        assert_eq!(memory.style_for("label"), "neutral");
    }

    #[test]
    fn test_style_can_be_learned() {
        let mut memory = LanguageMemory::new("fr");
        memory.set_style("paragraph", "formal");
        assert_eq!(memory.style_for("paragraph"), "formal");
        assert_eq!(memory.style_for("button"), "neutral");
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = LanguageMemory::new("ar");
        memory.add_term("Customer", "عميل");
        memory.set_style("label", "formal");
        memory.record_accepted("Create Invoice", "إنشاء فاتورة", "label", 0.95);
        memory.save(dir.path()).unwrap();

        let restored = LanguageMemory::load(dir.path(), "ar").unwrap();
        assert_eq!(restored.lang, "ar");
        assert_eq!(restored.lookup_term("Customer"), Some("عميل"));
        assert_eq!(restored.style_for("label"), "formal");
        assert_eq!(restored.example_count(), 1);
    }

    #[test]
    fn test_load_missing_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let memory = LanguageMemory::load(dir.path(), "de").unwrap();
        assert_eq!(memory.lang, "de");
        assert_eq!(memory.example_count(), 0);
    }

    #[test]
    fn test_load_corrupt_document_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("de_memory.json"), "{not json").unwrap();
        assert!(LanguageMemory::load(dir.path(), "de").is_err());
    }

    // ==================== Context Kind Tests ====================

    #[test]
    fn test_context_kind_from_field() {
        let ctx = TranslationContext::field_of(
            Layer::B,
            ArtifactKind::DatabaseRecord,
            "Report",
            "description",
            DataNature::Content,
        );
        assert_eq!(context_kind(&ctx), "paragraph");
    }

    #[test]
    fn test_context_kind_from_layer() {
        let code = TranslationContext::code_site(Layer::A, ArtifactKind::SourceCode);
        assert_eq!(context_kind(&code), "label");

        let mut content = TranslationContext::code_site(Layer::C, ArtifactKind::DatabaseRecord);
        content.field = None;
        assert_eq!(context_kind(&content), "paragraph");
    }
}
