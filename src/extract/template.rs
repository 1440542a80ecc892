//! Template extractor.
//!
//! Scans templating interpolation syntax for text wrapped in the same
//! translation markers the code extractor recognises: Jinja-style
//! `{{ _("...") }}` and Vue-style `{{ $t("...") }}`.

use super::{ArtifactKind, Candidate, Layer, Location, SourceArtifact, TranslationContext};
use regex::Regex;
use std::sync::OnceLock;

static JINJA_MARKER: OnceLock<Regex> = OnceLock::new();
static VUE_MARKER: OnceLock<Regex> = OnceLock::new();

/// Extracts translatable strings from template artifacts.
#[derive(Debug, Default)]
pub struct TemplateExtractor;

impl TemplateExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, artifact: &SourceArtifact) -> Vec<Candidate> {
        let jinja = JINJA_MARKER.get_or_init(|| {
            Regex::new(r#"\{\{\s*_\s*\(\s*["']([^"']+)["']\s*\)\s*\}\}"#)
                .expect("jinja marker regex must compile")
        });
        let vue = VUE_MARKER.get_or_init(|| {
            Regex::new(r#"\{\{\s*\$t\s*\(\s*["']([^"']+)["']\s*\)\s*\}\}"#)
                .expect("vue marker regex must compile")
        });

        let mut candidates = Vec::new();
        for (idx, line) in artifact.content.lines().enumerate() {
            for regex in [jinja, vue] {
                for cap in regex.captures_iter(line) {
                    let text = cap[1].to_string();
                    if text.trim().is_empty() {
                        continue;
                    }
                    candidates.push(Candidate {
                        source_text: text,
                        layer: Layer::A,
                        location: Location {
                            artifact: artifact.id.clone(),
                            line: (idx + 1) as u32,
                        },
                        context: TranslationContext::code_site(Layer::A, ArtifactKind::Template),
                    });
                }
            }
        }
        candidates
    }
}
