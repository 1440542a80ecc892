//! Translation-record sink: the only write surface toward persistent
//! application state.
//!
//! Accepted translations are upserted as dedicated translation records;
//! original content records are never mutated through any path in this
//! crate. The real implementation wraps the application's write adapter;
//! an in-memory sink serves tests and dry runs.

use anyhow::Result;
use std::sync::{Arc, Mutex};

/// One translation record to upsert, keyed by (source_text, language).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub source_text: String,
    pub translated_text: String,
    pub language: String,
    pub context_tag: String,
}

/// Write surface for translation records.
pub trait TranslationSink: Send + Sync {
    fn upsert(&mut self, record: SinkRecord) -> Result<()>;
}

/// Collects records in memory; inspectable by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<SinkRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SinkRecord] {
        &self.records
    }
}

impl TranslationSink for MemorySink {
    fn upsert(&mut self, record: SinkRecord) -> Result<()> {
        // Same key replaces the previous record, mirroring upsert
        // semantics of the real adapter.
        self.records.retain(|r| {
            !(r.source_text == record.source_text && r.language == record.language)
        });
        self.records.push(record);
        Ok(())
    }
}

/// Shared handle so a caller can keep inspecting the sink after handing
/// it to the orchestrator.
impl TranslationSink for Arc<Mutex<MemorySink>> {
    fn upsert(&mut self, record: SinkRecord) -> Result<()> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("sink mutex poisoned"))?
            .upsert(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, translated: &str) -> SinkRecord {
        SinkRecord {
            source_text: source.to_string(),
            translated_text: translated.to_string(),
            language: "ar".to_string(),
            context_tag: "A|SourceCode||".to_string(),
        }
    }

    #[test]
    fn test_upsert_inserts_and_replaces() {
        let mut sink = MemorySink::new();
        sink.upsert(record("Hello", "مرحبا")).unwrap();
        sink.upsert(record("World", "عالم")).unwrap();
        assert_eq!(sink.records().len(), 2);

        sink.upsert(record("Hello", "أهلا")).unwrap();
        assert_eq!(sink.records().len(), 2);
        let hello = sink
            .records()
            .iter()
            .find(|r| r.source_text == "Hello")
            .unwrap();
        assert_eq!(hello.translated_text, "أهلا");
    }
}
