//! Placeholder scanning, masking and safety contracts.
//!
//! Translatable strings frequently carry format slots (`{0}`, `%(name)s`,
//! `%s`, `{{ var }}`) and quoted identifiers (`'fieldname'`) that must
//! survive translation byte-for-byte. This module extracts those tokens
//! into a [`SafetyContract`], and can replace them with opaque anchor
//! tokens before a string is sent to the model so that the model cannot
//! corrupt them, restoring the originals afterwards.

use regex::Regex;
use std::sync::OnceLock;

// One combined pattern so occurrences come back in source order.
// Alternation order matters: `{{ var }}` must win over `{0}`-style slots.
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
static IDENTIFIER_SPAN_REGEX: OnceLock<Regex> = OnceLock::new();
static EMBEDDED_URL_REGEX: OnceLock<Regex> = OnceLock::new();
static ANCHOR_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(
            r"(\{\{\s*[^{}]+?\s*\}\})|(%\([A-Za-z_][A-Za-z0-9_]*\)[sd])|(%[sd])|(\{[0-9]+\})",
        )
        .expect("placeholder regex must compile")
    })
}

fn identifier_span_regex() -> &'static Regex {
    IDENTIFIER_SPAN_REGEX.get_or_init(|| {
        // Quoted snake_case / lowerCamel tokens inside a sentence, e.g.
        // "the 'due_date' field". Plain apostrophes ("it's") don't match
        // because the closing quote must follow the identifier directly.
        Regex::new(r"['`]([A-Za-z_][A-Za-z0-9_]{2,})['`]").expect("identifier regex must compile")
    })
}

fn embedded_url_regex() -> &'static Regex {
    EMBEDDED_URL_REGEX
        .get_or_init(|| Regex::new(r"https?://[^\s)\]]+").expect("url regex must compile"))
}

fn anchor_regex() -> &'static Regex {
    ANCHOR_REGEX.get_or_init(|| Regex::new(r"__PH\d+__").expect("anchor regex must compile"))
}

/// The invariants a translation of a given string must satisfy.
///
/// `placeholders` is the ordered list of format tokens found in the source
/// (duplicates kept, since count matters). `identifier_spans` are quoted
/// identifier-like substrings that must appear unchanged in any accepted
/// translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyContract {
    pub placeholders: Vec<String>,
    pub identifier_spans: Vec<String>,
}

impl SafetyContract {
    /// True when the contract imposes no constraints.
    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty() && self.identifier_spans.is_empty()
    }
}

/// Scan a source string and build its safety contract.
pub fn scan(text: &str) -> SafetyContract {
    let placeholders = placeholder_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    // Quoted identifiers and embedded URLs both must survive verbatim.
    let mut identifier_spans: Vec<String> = identifier_span_regex()
        .captures_iter(text)
        .filter_map(|cap| cap.get(0).map(|m| m.as_str().to_string()))
        .collect();
    identifier_spans.extend(
        embedded_url_regex()
            .find_iter(text)
            .map(|m| m.as_str().to_string()),
    );

    SafetyContract {
        placeholders,
        identifier_spans,
    }
}

/// Extract placeholder tokens only, in source order.
pub fn placeholders_of(text: &str) -> Vec<String> {
    placeholder_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replace placeholders with stable anchor tokens (`__PH0__`, `__PH1__`, ...).
///
/// Returns the masked text plus the token → original mapping needed by
/// [`restore`]. Masking each occurrence separately keeps duplicates intact.
pub fn mask(text: &str) -> (String, Vec<(String, String)>) {
    let mut map = Vec::new();
    let mut counter = 0usize;
    let masked = placeholder_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let token = format!("__PH{}__", counter);
            counter += 1;
            map.push((token.clone(), caps[0].to_string()));
            token
        })
        .into_owned();
    (masked, map)
}

/// Reverse [`mask`], substituting anchor tokens back to their originals.
pub fn restore(text: &str, map: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (token, original) in map {
        out = out.replace(token, original);
    }
    out
}

/// True when a translated string still carries unexpanded anchor tokens,
/// which means the model altered or duplicated them and the result cannot
/// be trusted.
pub fn has_leftover_anchors(text: &str) -> bool {
    anchor_regex().is_match(text)
}
