//! Record-source extraction for layers B and C.
//!
//! Live record values are reached through the read-only [`RecordSource`]
//! collaborator; this module owns the fixed allow-list of record types and
//! fields that are safe to translate, and turns enumerated rows into
//! candidates. The core never writes through this interface.

use super::{ArtifactKind, Candidate, DataNature, Layer, Location, TranslationContext};
use anyhow::Result;
use std::collections::HashMap;
use tracing::warn;

/// A record type plus the fields worth extracting from it.
#[derive(Debug, Clone)]
pub struct RecordScope {
    pub record_type: &'static str,
    pub fields: &'static [&'static str],
    pub layer: Layer,
}

/// Layer B: UI metadata stored in records.
pub const LAYER_B_SCOPES: &[RecordScope] = &[
    RecordScope {
        record_type: "Workspace",
        fields: &["label", "title", "description"],
        layer: Layer::B,
    },
    RecordScope {
        record_type: "Report",
        fields: &["report_name", "label"],
        layer: Layer::B,
    },
    RecordScope {
        record_type: "Dashboard",
        fields: &["dashboard_name", "label"],
        layer: Layer::B,
    },
    RecordScope {
        record_type: "Dashboard Chart",
        fields: &["chart_name", "label"],
        layer: Layer::B,
    },
    RecordScope {
        record_type: "Number Card",
        fields: &["label"],
        layer: Layer::B,
    },
];

/// Layer C: user content stored in records.
pub const LAYER_C_SCOPES: &[RecordScope] = &[
    RecordScope {
        record_type: "Web Page",
        fields: &["title", "content"],
        layer: Layer::C,
    },
    RecordScope {
        record_type: "Blog Post",
        fields: &["title", "content"],
        layer: Layer::C,
    },
    RecordScope {
        record_type: "Email Template",
        fields: &["subject", "message"],
        layer: Layer::C,
    },
    RecordScope {
        record_type: "Notification",
        fields: &["subject", "message"],
        layer: Layer::C,
    },
];

/// One field value of one record, as enumerated by a [`RecordSource`].
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub record_id: String,
    pub field: String,
    pub value: String,
}

/// Read-only collaborator that enumerates record field values. The real
/// implementation wraps the application's database adapter; tests use
/// [`StaticRecordSource`].
pub trait RecordSource: Send + Sync {
    fn enumerate(&self, scope: &RecordScope) -> Result<Vec<RecordRow>>;
}

/// In-memory record source keyed by record type. Doubles as the dry-run
/// stand-in when no database adapter is wired up.
#[derive(Debug, Default)]
pub struct StaticRecordSource {
    rows: HashMap<String, Vec<RecordRow>>,
}

impl StaticRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record_type: &str, record_id: &str, field: &str, value: &str) {
        self.rows
            .entry(record_type.to_string())
            .or_default()
            .push(RecordRow {
                record_id: record_id.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            });
    }
}

impl RecordSource for StaticRecordSource {
    fn enumerate(&self, scope: &RecordScope) -> Result<Vec<RecordRow>> {
        let rows = self.rows.get(scope.record_type).cloned().unwrap_or_default();
        // Honor the field allow-list even if the source has extra rows.
        Ok(rows
            .into_iter()
            .filter(|row| scope.fields.contains(&row.field.as_str()))
            .collect())
    }
}

/// Extracts candidates from a record source over the configured scopes.
pub struct RecordsExtractor<'a> {
    source: &'a dyn RecordSource,
}

impl<'a> RecordsExtractor<'a> {
    pub fn new(source: &'a dyn RecordSource) -> Self {
        Self { source }
    }

    /// Scopes applicable to the requested layers, B before C.
    pub fn scopes_for_layers(layers: &[Layer]) -> Vec<RecordScope> {
        let mut scopes = Vec::new();
        if layers.contains(&Layer::B) {
            scopes.extend(LAYER_B_SCOPES.iter().cloned());
        }
        if layers.contains(&Layer::C) {
            scopes.extend(LAYER_C_SCOPES.iter().cloned());
        }
        scopes
    }

    /// Enumerate every scope for the given layers. A failing scope is
    /// logged and skipped; the remaining scopes still run.
    pub fn extract(&self, layers: &[Layer]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for scope in Self::scopes_for_layers(layers) {
            let rows = match self.source.enumerate(&scope) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Skipping record scope {}: {}", scope.record_type, e);
                    continue;
                }
            };
            for row in rows {
                if row.value.trim().is_empty() {
                    continue;
                }
                let data_nature = if scope.layer == Layer::B {
                    DataNature::Label
                } else {
                    DataNature::Content
                };
                candidates.push(Candidate {
                    source_text: row.value,
                    layer: scope.layer,
                    location: Location {
                        artifact: format!("{}/{}", scope.record_type, row.record_id),
                        line: 0,
                    },
                    context: TranslationContext::field_of(
                        scope.layer,
                        ArtifactKind::DatabaseRecord,
                        scope.record_type,
                        &row.field,
                        data_nature,
                    ),
                });
            }
        }
        candidates
    }
}
