//! Source-code extractor.
//!
//! Finds calls to the application's translation markers (`_("...")`,
//! `__("...")`, `_lt("...")`, `frappe._("...")`) and extracts their
//! string-literal arguments. A small structural scanner walks the source
//! tracking string and comment state, so escaped quotes, multi-line
//! literals and interpolated strings do not produce false positives the
//! way a plain pattern match would. A permissive regex scan remains as a
//! fallback for artifacts the scanner cannot get through.

use super::{ArtifactKind, Candidate, Layer, Location, SourceArtifact, TranslationContext};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

static FALLBACK_DQUOTE: OnceLock<Regex> = OnceLock::new();
static FALLBACK_SQUOTE: OnceLock<Regex> = OnceLock::new();

/// Marker functions whose first string-literal argument is user-facing.
const MARKERS: &[&str] = &["_", "__", "_lt"];

/// Extracts translatable string literals from code artifacts.
#[derive(Debug, Default)]
pub struct CodeExtractor;

impl CodeExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract candidates from one code artifact.
    ///
    /// Structural scanning is tried first; when the artifact is broken
    /// enough that the scanner cannot finish (e.g. an unterminated string
    /// literal), the artifact is re-scanned with the permissive pattern
    /// fallback instead of aborting the run.
    pub fn extract(&self, artifact: &SourceArtifact) -> Vec<Candidate> {
        let found = match scan_source(&artifact.content) {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "Structural scan of {} failed ({}), falling back to pattern scan",
                    artifact.id, e
                );
                self.pattern_scan(&artifact.content)
            }
        };

        found
            .into_iter()
            .map(|(text, line)| Candidate {
                source_text: text,
                layer: Layer::A,
                location: Location {
                    artifact: artifact.id.clone(),
                    line,
                },
                context: TranslationContext::code_site(Layer::A, ArtifactKind::SourceCode),
            })
            .collect()
    }

    /// Permissive line-oriented fallback for artifacts structural scanning
    /// cannot handle. Does not see multi-line literals.
    pub fn pattern_scan(&self, content: &str) -> Vec<(String, u32)> {
        let dquote = FALLBACK_DQUOTE.get_or_init(|| {
            Regex::new(r#"(?:^|[^A-Za-z0-9_.])(?:__|_lt|_)\s*\(\s*"((?:[^"\\]|\\.)+)""#)
                .expect("fallback regex must compile")
        });
        let squote = FALLBACK_SQUOTE.get_or_init(|| {
            Regex::new(r"(?:^|[^A-Za-z0-9_.])(?:__|_lt|_)\s*\(\s*'((?:[^'\\]|\\.)+)'")
                .expect("fallback regex must compile")
        });

        let mut found = Vec::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line = (idx + 1) as u32;
            for regex in [dquote, squote] {
                for cap in regex.captures_iter(raw_line) {
                    let text = unescape(&cap[1]);
                    if !text.trim().is_empty() {
                        found.push((text, line));
                    }
                }
            }
        }
        found
    }
}

#[derive(Debug)]
enum ScanError {
    UnterminatedString { line: u32 },
    UnterminatedComment { line: u32 },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::UnterminatedString { line } => {
                write!(f, "unterminated string literal at line {}", line)
            }
            ScanError::UnterminatedComment { line } => {
                write!(f, "unterminated block comment at line {}", line)
            }
        }
    }
}

/// Walk the source and return every marker-call string literal with the
/// line it starts on.
fn scan_source(content: &str) -> Result<Vec<(String, u32)>, ScanError> {
    let chars: Vec<char> = content.chars().collect();
    let mut found = Vec::new();
    let mut i = 0usize;
    let mut line = 1u32;
    // Set when the previous token was `<word>.` so `frappe._("x")` links up.
    let mut pending_prefix: Option<String> = None;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                pending_prefix = None;
                i += 1;
            }
            '#' => {
                i = skip_line(&chars, i);
            }
            '/' if matches!(chars.get(i + 1), Some('/')) => {
                i = skip_line(&chars, i);
            }
            '/' if matches!(chars.get(i + 1), Some('*')) => {
                i = skip_block_comment(&chars, i + 2, &mut line)
                    .ok_or(ScanError::UnterminatedComment { line })?;
            }
            '"' | '\'' => {
                // A bare string literal outside a marker call: skip it.
                let (_, next) = read_literal(&chars, i, c, &mut line)
                    .ok_or(ScanError::UnterminatedString { line })?;
                pending_prefix = None;
                i = next;
            }
            '`' => {
                // JS template literals are interpolated; never extract them.
                i = skip_template_literal(&chars, i + 1, &mut line)
                    .ok_or(ScanError::UnterminatedString { line })?;
                pending_prefix = None;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let j = skip_inline_ws(&chars, i);

                match chars.get(j) {
                    Some('.') => {
                        pending_prefix = Some(word);
                        i = j + 1;
                    }
                    Some('(') if is_marker(&word, pending_prefix.as_deref()) => {
                        pending_prefix = None;
                        let k = skip_ws(&chars, j + 1, &mut line);
                        match chars.get(k) {
                            Some(&q) if q == '"' || q == '\'' => {
                                let literal_line = line;
                                let (text, next) = read_literal(&chars, k, q, &mut line)
                                    .ok_or(ScanError::UnterminatedString { line })?;
                                if !text.trim().is_empty() {
                                    found.push((text, literal_line));
                                }
                                i = next;
                            }
                            // f-string / raw / bytes prefix or template
                            // literal: interpolated, not a plain literal.
                            _ => i = k,
                        }
                    }
                    _ => {
                        pending_prefix = None;
                        i = j.max(i);
                    }
                }
            }
            _ => {
                pending_prefix = None;
                i += 1;
            }
        }
    }

    Ok(found)
}

fn is_marker(word: &str, prefix: Option<&str>) -> bool {
    MARKERS.contains(&word) && matches!(prefix, None | Some("frappe"))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn skip_line(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn skip_inline_ws(chars: &[char], mut i: usize) -> usize {
    while matches!(chars.get(i), Some(' ') | Some('\t')) {
        i += 1;
    }
    i
}

fn skip_ws(chars: &[char], mut i: usize, line: &mut u32) -> usize {
    while let Some(&c) = chars.get(i) {
        if c == '\n' {
            *line += 1;
        } else if c != ' ' && c != '\t' && c != '\r' {
            break;
        }
        i += 1;
    }
    i
}

fn skip_block_comment(chars: &[char], mut i: usize, line: &mut u32) -> Option<usize> {
    while i < chars.len() {
        if chars[i] == '\n' {
            *line += 1;
        } else if chars[i] == '*' && matches!(chars.get(i + 1), Some('/')) {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

fn skip_template_literal(chars: &[char], mut i: usize, line: &mut u32) -> Option<usize> {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => {
                *line += 1;
                i += 1;
            }
            '`' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Read a string literal starting at the opening quote. Handles escape
/// sequences and Python triple quotes. Returns the decoded text and the
/// index just past the closing quote, or `None` on EOF.
fn read_literal(chars: &[char], i: usize, quote: char, line: &mut u32) -> Option<(String, usize)> {
    let triple = chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote);
    let mut pos = if triple { i + 3 } else { i + 1 };
    let mut text = String::new();

    while pos < chars.len() {
        let c = chars[pos];
        if c == '\\' {
            match chars.get(pos + 1) {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('\\') => text.push('\\'),
                Some(&e) if e == quote => text.push(quote),
                Some(&other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => return None,
            }
            pos += 2;
            continue;
        }
        if c == '\n' {
            *line += 1;
        }
        if c == quote {
            if triple {
                if chars.get(pos + 1) == Some(&quote) && chars.get(pos + 2) == Some(&quote) {
                    return Some((text, pos + 3));
                }
            } else {
                return Some((text, pos + 1));
            }
        }
        text.push(c);
        pos += 1;
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(e) => out.push(e),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
