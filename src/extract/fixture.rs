//! Structured-fixture extractor.
//!
//! Walks JSON fixture documents and emits values for a fixed allow-list of
//! fields known to hold user-facing labels, tagged with the owning record
//! type. Nested field definitions and custom fields are included; values
//! that look like identifiers are left alone (the policy engine would
//! reject them anyway, this just keeps the candidate stream clean).

use super::{ArtifactKind, Candidate, DataNature, Layer, Location, SourceArtifact,
    TranslationContext};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

static IDENTIFIER_VALUE: OnceLock<Regex> = OnceLock::new();

/// Allow-list of label-bearing fields per record type. Unknown record
/// types fall back to `label` only.
const FIELD_MAP: &[(&str, &[&str])] = &[
    ("DocType", &["label", "description", "title"]),
    ("Workspace", &["label", "title"]),
    ("Report", &["report_name", "label"]),
    ("Dashboard", &["dashboard_name", "label"]),
    ("Dashboard Chart", &["chart_name", "label"]),
    ("Number Card", &["label"]),
];

const DEFAULT_FIELDS: &[&str] = &["label"];

/// Fields extracted from entries of a nested `fields` array.
const NESTED_FIELDS: &[&str] = &["label", "description", "options"];

/// Fields extracted from entries of a `custom_fields` array.
const CUSTOM_FIELDS: &[&str] = &["label", "description", "default"];

/// Extracts translatable values from JSON fixture artifacts.
#[derive(Debug, Default)]
pub struct FixtureExtractor;

impl FixtureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, artifact: &SourceArtifact) -> Vec<Candidate> {
        let parsed: Value = match serde_json::from_str(&artifact.content) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping unparsable fixture {}: {}", artifact.id, e);
                return Vec::new();
            }
        };

        let items: Vec<&Value> = match &parsed {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut candidates = Vec::new();
        for item in items {
            let Some(record_type) = record_type_of(item) else {
                continue;
            };

            let allowed = FIELD_MAP
                .iter()
                .find(|(rt, _)| *rt == record_type)
                .map(|(_, fields)| *fields)
                .unwrap_or(DEFAULT_FIELDS);

            for field in allowed {
                self.push_value(&mut candidates, artifact, record_type, field, item.get(*field));
            }

            // DocType fixtures nest their field definitions.
            if record_type == "DocType" {
                self.extract_array(&mut candidates, artifact, record_type, item, "fields",
                    NESTED_FIELDS);
            }
            self.extract_array(&mut candidates, artifact, record_type, item, "custom_fields",
                CUSTOM_FIELDS);
        }
        candidates
    }

    fn extract_array(
        &self,
        candidates: &mut Vec<Candidate>,
        artifact: &SourceArtifact,
        record_type: &str,
        item: &Value,
        key: &str,
        allowed: &[&str],
    ) {
        let Some(Value::Array(entries)) = item.get(key) else {
            return;
        };
        for entry in entries {
            let fieldname = entry
                .get("fieldname")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            for field in allowed {
                let qualified = format!("{}.{}.{}", key, fieldname, field);
                self.push_named_value(candidates, artifact, record_type, &qualified,
                    field, entry.get(*field));
            }
        }
    }

    fn push_value(
        &self,
        candidates: &mut Vec<Candidate>,
        artifact: &SourceArtifact,
        record_type: &str,
        field: &str,
        value: Option<&Value>,
    ) {
        self.push_named_value(candidates, artifact, record_type, field, field, value);
    }

    fn push_named_value(
        &self,
        candidates: &mut Vec<Candidate>,
        artifact: &SourceArtifact,
        record_type: &str,
        qualified_field: &str,
        bare_field: &str,
        value: Option<&Value>,
    ) {
        let Some(text) = value.and_then(Value::as_str) else {
            return;
        };
        if text.trim().is_empty() || is_identifier_value(text) {
            return;
        }
        let data_nature = match bare_field {
            "label" | "title" | "report_name" | "dashboard_name" | "chart_name" => {
                DataNature::Label
            }
            _ => DataNature::Content,
        };
        candidates.push(Candidate {
            source_text: text.to_string(),
            layer: Layer::A,
            location: Location {
                artifact: artifact.id.clone(),
                line: 0,
            },
            context: TranslationContext::field_of(
                Layer::A,
                ArtifactKind::Fixture,
                record_type,
                qualified_field,
                data_nature,
            ),
        });
    }
}

fn record_type_of(item: &Value) -> Option<&str> {
    item.get("doctype")
        .or_else(|| item.get("type"))
        .and_then(Value::as_str)
}

fn is_identifier_value(text: &str) -> bool {
    let regex = IDENTIFIER_VALUE.get_or_init(|| {
        Regex::new(r"^(?:[a-z_][a-z0-9_]*|[A-Z_][A-Z0-9_]+)$").expect("identifier regex")
    });
    text.len() < 50 && regex.is_match(text)
}
