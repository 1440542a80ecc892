//! Context profile: per-application descriptive context, plus seeding of
//! language memory from translations that were already accepted in
//! earlier runs.

use crate::memory::{context_kind, LanguageMemory};
use crate::storage::{EntryStatus, TranslationEntry, TranslationStore};
use std::collections::BTreeMap;
use tracing::debug;

/// What the application is about, used to bias prompts toward the right
/// register ("HR Management System" translates differently than a game).
#[derive(Debug, Clone, Default)]
pub struct ContextProfile {
    pub app: String,
    pub description: Option<String>,
}

impl ContextProfile {
    pub fn new(app: &str, description: Option<&str>) -> Self {
        Self {
            app: app.to_string(),
            description: description.map(str::to_string),
        }
    }

    /// One-line description for prompt assembly, if anything is known.
    pub fn describe(&self) -> Option<String> {
        self.description
            .as_ref()
            .map(|d| format!("{} ({})", d, self.app))
    }
}

/// Prime a fresh language memory from the already-persisted store:
/// recurring capitalized terms become terminology, and every accepted
/// entry contributes a style data point.
pub fn seed_memory(memory: &mut LanguageMemory, store: &TranslationStore) {
    let accepted: Vec<&TranslationEntry> = store
        .entries()
        .values()
        .filter(|e| e.status == EntryStatus::Accepted && !e.translated_text.is_empty())
        .collect();
    if accepted.is_empty() {
        return;
    }

    let mined = mine_terminology(&accepted);
    let mined_count = mined.len();
    for (source, translated) in mined {
        if memory.lookup_term(&source).is_none() {
            memory.add_term(&source, &translated);
        }
    }

    for (kind, style) in detect_style(&accepted) {
        memory.set_style(&kind, &style);
    }

    debug!(
        "Seeded memory for {} with {} mined terms from {} accepted entries",
        memory.lang,
        mined_count,
        accepted.len()
    );
}

/// Capitalized words recurring across entries are treated as domain
/// terminology; their translation is guessed positionally from the
/// aligned target text. First mapping wins.
fn mine_terminology(entries: &[&TranslationEntry]) -> BTreeMap<String, String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        for word in entry.source_text.split_whitespace() {
            let clean = clean_word(word);
            if clean.len() > 2 && clean.chars().next().is_some_and(char::is_uppercase) {
                *counts.entry(clean.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut terminology = BTreeMap::new();
    for entry in entries {
        let source_words: Vec<&str> = entry.source_text.split_whitespace().collect();
        let target_words: Vec<&str> = entry.translated_text.split_whitespace().collect();
        for (i, word) in source_words.iter().enumerate() {
            let clean = clean_word(word);
            if counts.get(clean).copied().unwrap_or(0) < 2 {
                continue;
            }
            if let Some(target) = target_words.get(i) {
                let target_clean = clean_word(target);
                if !target_clean.is_empty() {
                    terminology
                        .entry(clean.to_string())
                        .or_insert_with(|| target_clean.to_string());
                }
            }
        }
    }
    terminology
}

/// Style detection per context kind. Tone analysis of the target language
/// is out of reach here, so every observed kind gets the neutral profile;
/// review tooling can refine it later.
fn detect_style(entries: &[&TranslationEntry]) -> BTreeMap<String, String> {
    let mut styles = BTreeMap::new();
    for entry in entries {
        styles
            .entry(context_kind(&entry.context).to_string())
            .or_insert_with(|| "neutral".to_string());
    }
    styles
}

fn clean_word(word: &str) -> &str {
    word.trim_matches(|c: char| ".,!?;:".contains(c))
}
