//! Extraction layer: turning heterogeneous source artifacts into a uniform
//! stream of translation candidates.
//!
//! # Architecture
//!
//! - `code`: structural scanner for translation-marker calls in source files
//! - `template`: marker patterns inside template interpolation syntax
//! - `fixture`: allow-listed fields of structured JSON fixtures
//! - `records`: collaborator-backed extraction of live record field values
//!
//! Each extractor is side-effect-free and restartable: re-scanning an
//! artifact yields the same candidates. A single unreadable or unparsable
//! artifact is logged and skipped; it never aborts the run.

mod code;
mod fixture;
mod records;
mod template;

pub use code::CodeExtractor;
pub use fixture::FixtureExtractor;
pub use records::{RecordRow, RecordScope, RecordSource, RecordsExtractor, StaticRecordSource};
pub use template::TemplateExtractor;

use std::fmt;
use std::path::Path;
use tracing::warn;

/// Extraction domains of increasing translation permissiveness.
///
/// Layer A is code and files, Layer B is UI metadata, Layer C is user
/// content. The policy engine is conservative for A and permissive for C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    A,
    B,
    C,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::A => write!(f, "A"),
            Layer::B => write!(f, "B"),
            Layer::C => write!(f, "C"),
        }
    }
}

/// The kind of artifact a candidate was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SourceCode,
    Template,
    Fixture,
    DatabaseRecord,
}

/// Whether a value is a short UI label or free-form content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataNature {
    Label,
    Content,
}

/// Who the text is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    UserFacing,
    Internal,
}

/// Structural context attached to a candidate, carried through to the
/// policy engine, the external translator and language memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationContext {
    pub layer: Layer,
    pub artifact: ArtifactKind,
    /// Owning record type for fixture/database values (e.g. "Report").
    pub record_type: Option<String>,
    /// Field name, or the code-site kind for code candidates.
    pub field: Option<String>,
    pub data_nature: DataNature,
    pub intent: Intent,
}

impl TranslationContext {
    /// Context for a translation-marker call found in code or a template.
    pub fn code_site(layer: Layer, artifact: ArtifactKind) -> Self {
        Self {
            layer,
            artifact,
            record_type: None,
            field: None,
            data_nature: DataNature::Label,
            intent: Intent::UserFacing,
        }
    }

    /// Context for a named field of a record or fixture.
    pub fn field_of(
        layer: Layer,
        artifact: ArtifactKind,
        record_type: &str,
        field: &str,
        data_nature: DataNature,
    ) -> Self {
        Self {
            layer,
            artifact,
            record_type: Some(record_type.to_string()),
            field: Some(field.to_string()),
            data_nature,
            intent: Intent::UserFacing,
        }
    }

    /// Stable string form of the context, used in cache fingerprints and
    /// as the context tag persisted alongside store entries.
    pub fn signature(&self) -> String {
        format!(
            "{}|{:?}|{}|{}",
            self.layer,
            self.artifact,
            self.record_type.as_deref().unwrap_or(""),
            self.field.as_deref().unwrap_or(""),
        )
    }

    /// Rebuild a context from a persisted signature tag. Data nature is
    /// inferred from the field name the same way the extractors assign it.
    pub fn from_signature(tag: &str) -> Option<Self> {
        let mut parts = tag.splitn(4, '|');
        let layer = match parts.next()? {
            "A" => Layer::A,
            "B" => Layer::B,
            "C" => Layer::C,
            _ => return None,
        };
        let artifact = match parts.next()? {
            "SourceCode" => ArtifactKind::SourceCode,
            "Template" => ArtifactKind::Template,
            "Fixture" => ArtifactKind::Fixture,
            "DatabaseRecord" => ArtifactKind::DatabaseRecord,
            _ => return None,
        };
        let record_type = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let field = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let data_nature = match field.as_deref() {
            None => DataNature::Label,
            Some(f) => {
                let bare = f.rsplit('.').next().unwrap_or(f);
                if matches!(
                    bare,
                    "label" | "title" | "report_name" | "dashboard_name" | "chart_name"
                ) {
                    DataNature::Label
                } else {
                    DataNature::Content
                }
            }
        };
        Some(Self {
            layer,
            artifact,
            record_type,
            field,
            data_nature,
            intent: Intent::UserFacing,
        })
    }
}

/// Where a candidate came from: artifact id plus a line or record reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub artifact: String,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "{}:{}", self.artifact, self.line)
        } else {
            write!(f, "{}", self.artifact)
        }
    }
}

/// A candidate string produced by an extractor. Immutable; consumed once
/// by the policy engine.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_text: String,
    pub layer: Layer,
    pub location: Location,
    pub context: TranslationContext,
}

/// A source artifact handed to the file-based extractors. The caller owns
/// discovery and reading; extractors only see id + content.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub content: String,
}

/// Closed set of file-based extractors, selected by artifact kind at the
/// point of enumeration.
pub enum Extractor {
    Code(CodeExtractor),
    Template(TemplateExtractor),
    Fixture(FixtureExtractor),
}

impl Extractor {
    /// Pick the extractor for a file extension, if the kind is known.
    pub fn for_extension(ext: &str) -> Option<Self> {
        kind_for_extension(ext).and_then(Self::for_kind)
    }

    /// Pick the extractor for an artifact kind. Database records go
    /// through the collaborator-backed [`RecordsExtractor`] instead.
    pub fn for_kind(kind: ArtifactKind) -> Option<Self> {
        match kind {
            ArtifactKind::SourceCode => Some(Extractor::Code(CodeExtractor::new())),
            ArtifactKind::Template => Some(Extractor::Template(TemplateExtractor::new())),
            ArtifactKind::Fixture => Some(Extractor::Fixture(FixtureExtractor::new())),
            ArtifactKind::DatabaseRecord => None,
        }
    }

    /// Run the extractor over one artifact.
    pub fn extract(&self, artifact: &SourceArtifact) -> Vec<Candidate> {
        match self {
            Extractor::Code(e) => e.extract(artifact),
            Extractor::Template(e) => e.extract(artifact),
            Extractor::Fixture(e) => e.extract(artifact),
        }
    }
}

/// Directories that never hold translatable sources.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    "dist",
    "build",
    "target",
];

/// Walk an application directory and read every artifact a file-based
/// extractor can handle. Unreadable files are skipped with a warning.
pub fn collect_artifacts(root: &Path) -> Vec<SourceArtifact> {
    let mut artifacts = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if !is_skipped_dir(&path) {
                    stack.push(path);
                }
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(kind) = kind_for_extension(ext) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => artifacts.push(SourceArtifact {
                    id: relative_id(root, &path),
                    kind,
                    content,
                }),
                Err(e) => warn!("Skipping unreadable file {}: {}", path.display(), e),
            }
        }
    }

    // Deterministic downstream batching regardless of directory order.
    artifacts.sort_by(|a, b| a.id.cmp(&b.id));
    artifacts
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| SKIP_DIRS.contains(&n) || n.starts_with('.'))
        .unwrap_or(true)
}

fn kind_for_extension(ext: &str) -> Option<ArtifactKind> {
    match ext {
        "py" | "js" | "jsx" | "ts" => Some(ArtifactKind::SourceCode),
        "html" | "jinja" | "jinja2" | "vue" => Some(ArtifactKind::Template),
        "json" => Some(ArtifactKind::Fixture),
        _ => None,
    }
}

fn relative_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Extract candidates from every artifact, choosing the extractor by kind.
pub fn extract_all(artifacts: &[SourceArtifact]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for artifact in artifacts {
        if let Some(extractor) = Extractor::for_kind(artifact.kind) {
            candidates.extend(extractor.extract(artifact));
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_signature_is_stable() {
        let ctx = TranslationContext::field_of(
            Layer::B,
            ArtifactKind::Fixture,
            "Report",
            "label",
            DataNature::Label,
        );
        assert_eq!(ctx.signature(), "B|Fixture|Report|label");
    }

    #[test]
    fn test_context_signature_roundtrip() {
        let ctx = TranslationContext::field_of(
            Layer::C,
            ArtifactKind::DatabaseRecord,
            "Email Template",
            "subject",
            DataNature::Content,
        );
        let restored = TranslationContext::from_signature(&ctx.signature()).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_context_from_malformed_signature() {
        assert!(TranslationContext::from_signature("Z|Nowhere||").is_none());
        assert!(TranslationContext::from_signature("garbage").is_none());
    }

    #[test]
    fn test_location_display_with_line() {
        let loc = Location {
            artifact: "app/views.py".to_string(),
            line: 42,
        };
        assert_eq!(loc.to_string(), "app/views.py:42");
    }

    #[test]
    fn test_location_display_without_line() {
        let loc = Location {
            artifact: "Report/Sales".to_string(),
            line: 0,
        };
        assert_eq!(loc.to_string(), "Report/Sales");
    }

    #[test]
    fn test_extractor_selection_by_extension() {
        assert!(matches!(
            Extractor::for_extension("py"),
            Some(Extractor::Code(_))
        ));
        assert!(matches!(
            Extractor::for_extension("vue"),
            Some(Extractor::Template(_))
        ));
        assert!(matches!(
            Extractor::for_extension("json"),
            Some(Extractor::Fixture(_))
        ));
        assert!(Extractor::for_extension("png").is_none());
    }

    #[test]
    fn test_collect_artifacts_skips_vendored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(
            dir.path().join("node_modules/lib.js"),
            "__(\"Vendored\")",
        )
        .unwrap();
        std::fs::write(dir.path().join("app.py"), "_(\"Hello\")").unwrap();

        let artifacts = collect_artifacts(dir.path());
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].id, "app.py");
    }
}
