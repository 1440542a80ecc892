//! Persistent translation store and the non-destructive merge engine.
//!
//! The store is an ordered mapping keyed by source text, persisted as CSV
//! with a stable column order (`Source,Translation,Context,Status`) and a
//! stable key ordering so diffs stay readable. Legacy two-column files are
//! read transparently.
//!
//! Merging is the most safety-critical operation in the system: it is a
//! pure function over two immutable snapshots that produces a new snapshot
//! plus stats, and it never removes a key present in the existing set.
//! Commits are staged to a temp file and renamed into place, so a failure
//! mid-write leaves the previous file fully intact.

use crate::extract::{ArtifactKind, Layer, TranslationContext};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("translation store {path} is unreadable or corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("i/o failure on translation store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Review lifecycle of a stored translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Accepted,
    NeedsReview,
    Rejected,
}

impl EntryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Accepted => "accepted",
            EntryStatus::NeedsReview => "needs_review",
            EntryStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "needs_review" => EntryStatus::NeedsReview,
            "rejected" => EntryStatus::Rejected,
            _ => EntryStatus::Accepted,
        }
    }
}

/// One stored translation. `source_text` is the unique key within a
/// target language.
#[derive(Debug, Clone)]
pub struct TranslationEntry {
    pub source_text: String,
    pub translated_text: String,
    pub context: TranslationContext,
    pub status: EntryStatus,
    pub confidence: f32,
}

impl TranslationEntry {
    pub fn accepted(source_text: &str, translated_text: &str, context: TranslationContext) -> Self {
        Self {
            source_text: source_text.to_string(),
            translated_text: translated_text.to_string(),
            context,
            status: EntryStatus::Accepted,
            confidence: 0.95,
        }
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    fn default_context() -> TranslationContext {
        TranslationContext::code_site(Layer::A, ArtifactKind::SourceCode)
    }
}

/// How a merge treats keys that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Only keys absent from the existing set are added; present keys are
    /// left untouched whatever the batch says. The default.
    AddMissingOnly,
    /// Present keys are overwritten, but only by `Accepted` entries.
    UpdateExisting,
}

/// What a merge did. `changed() == 0` means the merge was a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    /// Existing keys the batch also carried but which were left alone.
    pub left_untouched: usize,
    /// Batch entries dropped because their status forbids the write.
    pub dropped: usize,
}

impl MergeStats {
    pub fn changed(&self) -> usize {
        self.added + self.updated
    }
}

/// Reconcile a batch with an existing snapshot.
///
/// Pure: neither input is mutated. The result always contains every key
/// of `existing` (nothing is ever implicitly removed), and re-running the
/// same batch against the result changes nothing further.
pub fn merge(
    existing: &BTreeMap<String, TranslationEntry>,
    batch: &[TranslationEntry],
    mode: MergeMode,
) -> (BTreeMap<String, TranslationEntry>, MergeStats) {
    let mut merged = existing.clone();
    let mut stats = MergeStats::default();

    // Later duplicates within one batch supersede earlier ones; without
    // this, re-merging the same batch would not be a no-op under
    // UpdateExisting.
    let mut deduped: BTreeMap<&str, &TranslationEntry> = BTreeMap::new();
    for entry in batch {
        deduped.insert(entry.source_text.as_str(), entry);
    }

    for entry in deduped.into_values() {
        if entry.status == EntryStatus::Rejected {
            stats.dropped += 1;
            continue;
        }
        match merged.get(&entry.source_text) {
            None => {
                merged.insert(entry.source_text.clone(), entry.clone());
                stats.added += 1;
            }
            Some(current) => match mode {
                MergeMode::AddMissingOnly => stats.left_untouched += 1,
                MergeMode::UpdateExisting => {
                    if entry.status != EntryStatus::Accepted {
                        stats.dropped += 1;
                    } else if current.translated_text == entry.translated_text {
                        stats.left_untouched += 1;
                    } else {
                        merged.insert(entry.source_text.clone(), entry.clone());
                        stats.updated += 1;
                    }
                }
            },
        }
    }

    (merged, stats)
}

/// CSV-backed translation store for one target language.
#[derive(Debug)]
pub struct TranslationStore {
    dir: PathBuf,
    lang: String,
    entries: BTreeMap<String, TranslationEntry>,
}

impl TranslationStore {
    /// Load the store for a language. A missing file starts an empty
    /// store; an unreadable or unparsable file is fatal for the run and
    /// is left untouched on disk.
    pub fn open(dir: &Path, lang: &str) -> Result<Self, StorageError> {
        let mut store = Self {
            dir: dir.to_path_buf(),
            lang: lang.to_string(),
            entries: BTreeMap::new(),
        };
        let path = store.csv_path();
        if !path.exists() {
            return Ok(store);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                source: e,
            })?;

        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                source: e,
            })?;
            if record.len() < 2 {
                continue;
            }
            let source = record.get(0).unwrap_or("").trim().to_string();
            let translated = record.get(1).unwrap_or("").trim().to_string();
            if source.is_empty() || (idx == 0 && is_header_row(&record)) {
                continue;
            }
            let context = record
                .get(2)
                .and_then(TranslationContext::from_signature)
                .unwrap_or_else(TranslationEntry::default_context);
            let status = record
                .get(3)
                .map(EntryStatus::parse)
                .unwrap_or(EntryStatus::Accepted);
            // Existing rows are preserved exactly; lookups key on the
            // verbatim source text.
            store.entries.insert(
                source.clone(),
                TranslationEntry {
                    source_text: source,
                    translated_text: translated,
                    context,
                    status,
                    confidence: 0.95,
                },
            );
        }
        debug!(
            "Loaded {} translations for {} from {}",
            store.entries.len(),
            lang,
            path.display()
        );
        Ok(store)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.lang))
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source_text: &str) -> Option<&TranslationEntry> {
        self.entries.get(source_text)
    }

    pub fn contains(&self, source_text: &str) -> bool {
        self.entries.contains_key(source_text)
    }

    /// Ordered view of the stored entries.
    pub fn entries(&self) -> &BTreeMap<String, TranslationEntry> {
        &self.entries
    }

    /// Which of the given source texts have no stored translation yet.
    pub fn missing_from<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        texts
            .into_iter()
            .filter(|t| !self.entries.contains_key(*t))
            .collect()
    }

    /// Drop entries whose whitespace-normalised source duplicates an
    /// earlier one. Returns how many were removed.
    pub fn deduplicate(&mut self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let before = self.entries.len();
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|(key, _)| seen.insert(normalize_text(key)))
            .collect();
        before - self.entries.len()
    }

    /// Merge a batch into the in-memory snapshot. The file is not touched
    /// until [`commit`](Self::commit).
    pub fn apply_merge(&mut self, batch: &[TranslationEntry], mode: MergeMode) -> MergeStats {
        let (merged, stats) = merge(&self.entries, batch, mode);
        self.entries = merged;
        stats
    }

    /// Atomically write the store: serialize everything to a sibling temp
    /// file, then rename over the live file.
    pub fn commit(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })?;
        let path = self.csv_path();
        let tmp = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| StorageError::Corrupt {
            path: tmp.display().to_string(),
            source: e,
        })?;
        let write_err = |e: csv::Error| StorageError::Corrupt {
            path: tmp.display().to_string(),
            source: e,
        };

        writer
            .write_record(["Source", "Translation", "Context", "Status"])
            .map_err(write_err)?;

        // Case-insensitive ordering keeps diffs stable across tools that
        // fold case differently.
        let mut ordered: Vec<&TranslationEntry> = self.entries.values().collect();
        ordered.sort_by(|a, b| {
            (a.source_text.to_lowercase(), &a.source_text)
                .cmp(&(b.source_text.to_lowercase(), &b.source_text))
        });
        for entry in ordered {
            let tag = entry.context.signature();
            writer
                .write_record([
                    entry.source_text.as_str(),
                    entry.translated_text.as_str(),
                    tag.as_str(),
                    entry.status.as_str(),
                ])
                .map_err(write_err)?;
        }
        writer.flush().map_err(|e| StorageError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;
        drop(writer);

        std::fs::rename(&tmp, &path).map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!("Committed {} translations to {}", self.len(), path.display());
        Ok(())
    }
}

fn is_header_row(record: &csv::StringRecord) -> bool {
    let col = |i: usize| {
        record
            .get(i)
            .map(|c| c.trim().to_lowercase())
            .unwrap_or_default()
    };
    matches!(col(0).as_str(), "source" | "source_text")
        && matches!(col(1).as_str(), "translation" | "translated" | "translated_text")
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Warn-level report of batch entries that conflicted with existing keys.
pub fn log_merge(stats: &MergeStats, mode: MergeMode) {
    debug!(
        "Merge ({:?}): {} added, {} updated, {} untouched, {} dropped",
        mode, stats.added, stats.updated, stats.left_untouched, stats.dropped
    );
    if stats.dropped > 0 {
        warn!("{} batch entries were not written", stats.dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, translated: &str) -> TranslationEntry {
        TranslationEntry::accepted(source, translated, TranslationEntry::default_context())
    }

    fn map_of(entries: &[TranslationEntry]) -> BTreeMap<String, TranslationEntry> {
        entries
            .iter()
            .map(|e| (e.source_text.clone(), e.clone()))
            .collect()
    }

    // ==================== Merge Semantics ====================

    #[test]
    fn test_add_missing_only_adds_new_keys() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("World", "عالم")];

        let (merged, stats) = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert_eq!(merged.len(), 2);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.changed(), 1);
    }

    #[test]
    fn test_add_missing_only_never_touches_existing() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("Hello", "أهلا")];

        let (merged, stats) = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert_eq!(merged["Hello"].translated_text, "مرحبا");
        assert_eq!(stats.added, 0);
        assert_eq!(stats.left_untouched, 1);
    }

    #[test]
    fn test_merge_never_removes_keys() {
        let existing = map_of(&[entry("Keep Me", "احتفظ بي"), entry("And Me", "وأنا")]);
        let batch = vec![entry("New Key", "جديد")];

        for mode in [MergeMode::AddMissingOnly, MergeMode::UpdateExisting] {
            let (merged, _) = merge(&existing, &batch, mode);
            assert!(merged.contains_key("Keep Me"));
            assert!(merged.contains_key("And Me"));
        }
    }

    #[test]
    fn test_update_existing_overwrites_with_accepted() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("Hello", "أهلا")];

        let (merged, stats) = merge(&existing, &batch, MergeMode::UpdateExisting);
        assert_eq!(merged["Hello"].translated_text, "أهلا");
        assert_eq!(stats.updated, 1);
    }

    #[test]
    fn test_update_existing_ignores_unaccepted() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("Hello", "أهلا").with_status(EntryStatus::NeedsReview)];

        let (merged, stats) = merge(&existing, &batch, MergeMode::UpdateExisting);
        assert_eq!(merged["Hello"].translated_text, "مرحبا");
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_rejected_entries_are_never_written() {
        let existing = BTreeMap::new();
        let batch = vec![entry("Bad", "سيئ").with_status(EntryStatus::Rejected)];

        let (merged, stats) = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert!(merged.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_needs_review_entries_are_added_as_new_keys() {
        let existing = BTreeMap::new();
        let batch = vec![entry("Hmm", "همم").with_status(EntryStatus::NeedsReview)];

        let (merged, stats) = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert_eq!(merged["Hmm"].status, EntryStatus::NeedsReview);
        assert_eq!(stats.added, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("World", "عالم"), entry("Hello", "أهلا")];

        let (first, first_stats) = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert_eq!(first_stats.changed(), 1);

        let (second, second_stats) = merge(&first, &batch, MergeMode::AddMissingOnly);
        assert_eq!(second_stats.changed(), 0);
        assert_eq!(second.len(), first.len());
        for (key, entry) in &first {
            assert_eq!(second[key].translated_text, entry.translated_text);
        }
    }

    #[test]
    fn test_merge_inputs_are_not_mutated() {
        let existing = map_of(&[entry("Hello", "مرحبا")]);
        let batch = vec![entry("World", "عالم")];
        let existing_before = existing.len();

        let _ = merge(&existing, &batch, MergeMode::AddMissingOnly);
        assert_eq!(existing.len(), existing_before);
        assert_eq!(batch.len(), 1);
    }

    // ==================== Property Tests ====================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_entries(max: usize) -> impl Strategy<Value = Vec<TranslationEntry>> {
            proptest::collection::vec(("[a-e]{1,3}", "[v-z]{1,3}"), 0..max).prop_map(|pairs| {
                pairs
                    .into_iter()
                    .map(|(s, t)| entry(&s, &t))
                    .collect::<Vec<_>>()
            })
        }

        proptest! {
            #[test]
            fn merge_monotonic_under_add_missing(
                existing in arb_entries(8),
                batch in arb_entries(8),
            ) {
                let existing = map_of(&existing);
                let (merged, _) = merge(&existing, &batch, MergeMode::AddMissingOnly);
                // Every existing key survives with its original value.
                for (key, entry) in &existing {
                    prop_assert_eq!(
                        &merged[key].translated_text,
                        &entry.translated_text
                    );
                }
                prop_assert!(merged.len() >= existing.len());
            }

            #[test]
            fn merge_idempotent_for_both_modes(
                existing in arb_entries(8),
                batch in arb_entries(8),
            ) {
                let existing = map_of(&existing);
                for mode in [MergeMode::AddMissingOnly, MergeMode::UpdateExisting] {
                    let (first, _) = merge(&existing, &batch, mode);
                    let (second, stats) = merge(&first, &batch, mode);
                    prop_assert_eq!(stats.changed(), 0);
                    prop_assert_eq!(first.len(), second.len());
                }
            }
        }
    }

    // ==================== Store Round-Trip ====================

    #[test]
    fn test_store_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranslationStore::open(dir.path(), "ar").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_commit_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TranslationStore::open(dir.path(), "ar").unwrap();
        store.apply_merge(
            &[entry("Hello", "مرحبا"), entry("World", "عالم")],
            MergeMode::AddMissingOnly,
        );
        store.commit().unwrap();

        let reloaded = TranslationStore::open(dir.path(), "ar").unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("Hello").unwrap().translated_text, "مرحبا");
        assert_eq!(reloaded.get("Hello").unwrap().status, EntryStatus::Accepted);
    }

    #[test]
    fn test_store_reads_legacy_two_column_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ar.csv"),
            "Source,Translation\nHello,مرحبا\nWorld,عالم\n",
        )
        .unwrap();

        let store = TranslationStore::open(dir.path(), "ar").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("World").unwrap().translated_text, "عالم");
    }

    #[test]
    fn test_store_reads_headerless_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ar.csv"), "Hello,مرحبا\n").unwrap();

        let store = TranslationStore::open(dir.path(), "ar").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_corrupt_file_is_fatal_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ar.csv");
        // Unbalanced quote makes the CSV unreadable.
        let corrupt = "Hello,\"مرحبا\nWorld,عالم\n";
        std::fs::write(&path, corrupt).unwrap();

        let result = TranslationStore::open(dir.path(), "ar");
        assert!(result.is_err());
        // The file on disk was not rewritten or truncated.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), corrupt);
    }

    #[test]
    fn test_commit_preserves_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ar.csv"),
            "Existing,موجود\n",
        )
        .unwrap();

        let mut store = TranslationStore::open(dir.path(), "ar").unwrap();
        store.apply_merge(&[entry("Fresh", "جديد")], MergeMode::AddMissingOnly);
        store.commit().unwrap();

        let reloaded = TranslationStore::open(dir.path(), "ar").unwrap();
        assert_eq!(reloaded.get("Existing").unwrap().translated_text, "موجود");
        assert_eq!(reloaded.get("Fresh").unwrap().translated_text, "جديد");
    }

    #[test]
    fn test_commit_writes_stable_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TranslationStore::open(dir.path(), "ar").unwrap();
        store.apply_merge(
            &[entry("banana", "b"), entry("Apple", "a"), entry("cherry", "c")],
            MergeMode::AddMissingOnly,
        );
        store.commit().unwrap();

        let body = std::fs::read_to_string(store.csv_path()).unwrap();
        let keys: Vec<&str> = body
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(keys, vec!["Apple", "banana", "cherry"]);
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_missing_from() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TranslationStore::open(dir.path(), "ar").unwrap();
        store.apply_merge(&[entry("Known", "معروف")], MergeMode::AddMissingOnly);

        let missing = store.missing_from(["Known", "Unknown"]);
        assert_eq!(missing, vec!["Unknown"]);
    }

    #[test]
    fn test_deduplicate_by_normalized_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TranslationStore::open(dir.path(), "ar").unwrap();
        store.apply_merge(
            &[entry("Save  Draft", "x"), entry("Save Draft", "y")],
            MergeMode::AddMissingOnly,
        );
        assert_eq!(store.len(), 2);
        let removed = store.deduplicate();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
