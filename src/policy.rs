//! Policy engine: context-aware classification of candidate strings.
//!
//! `classify` is a pure function from a candidate to a decision: no I/O,
//! no network, deterministic. Rules run in priority order and the first
//! match wins; whatever survives them is layer-gated (Layer A is
//! conservative, Layer C permissive) and finally marked TRANSLATE with a
//! safety contract any accepted translation must satisfy. `validate`
//! checks a returned translation against that contract and is reused by
//! the orchestrator and by review tooling.

use crate::extract::{Candidate, DataNature, Layer};
use crate::placeholder::{self, SafetyContract};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static ALL_CAPS: OnceLock<Regex> = OnceLock::new();
static URL: OnceLock<Regex> = OnceLock::new();
static EMAIL: OnceLock<Regex> = OnceLock::new();
static SNAKE_IDENT: OnceLock<Regex> = OnceLock::new();
static CAMEL_IDENT: OnceLock<Regex> = OnceLock::new();
static DOTTED_PATH: OnceLock<Regex> = OnceLock::new();

/// SQL keywords that must never be translated when they stand alone.
const SQL_KEYWORDS: &[&str] = &[
    "select", "from", "where", "join", "inner", "outer", "left", "right", "group", "by", "order",
    "having", "union", "insert", "update", "delete", "create", "alter", "drop", "table", "index",
    "view", "procedure", "function", "trigger", "grant", "revoke", "commit", "rollback",
    "transaction", "database", "schema", "constraint", "primary", "key", "foreign", "references",
    "default", "null", "not", "and", "or", "as", "distinct", "limit", "offset", "case", "when",
    "then", "else", "end", "like", "in", "exists", "between", "is", "all", "any", "some",
];

/// Field names that hold identifiers regardless of their value.
const TECHNICAL_FIELDS: &[&str] = &[
    "name", "route", "slug", "url", "link", "api_key", "fieldname",
];

/// What should happen to a candidate string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Translate,
    Skip,
    KeepOriginal,
}

/// Why a candidate was skipped, kept, or a result rejected. Rendered in
/// snake_case for the rejection ledger and run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    EmptyOrConstant,
    UrlOrEmail,
    IdentifierOrKeyword,
    LogicBearing,
    AmbiguousToken,
    PlaceholderMismatch,
    IdentifierAltered,
    WrongScript,
    ExternalFailure,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::EmptyOrConstant => "empty_or_constant",
            ReasonCode::UrlOrEmail => "url_or_email",
            ReasonCode::IdentifierOrKeyword => "identifier_or_keyword",
            ReasonCode::LogicBearing => "logic_bearing",
            ReasonCode::AmbiguousToken => "ambiguous_token",
            ReasonCode::PlaceholderMismatch => "placeholder_mismatch",
            ReasonCode::IdentifierAltered => "identifier_altered",
            ReasonCode::WrongScript => "wrong_script",
            ReasonCode::ExternalFailure => "external_failure",
        };
        write!(f, "{}", s)
    }
}

/// Result of classifying one candidate.
///
/// A `Translate` verdict always carries a safety contract, possibly empty.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub verdict: Verdict,
    pub reason: Option<ReasonCode>,
    pub safety_contract: Option<SafetyContract>,
}

impl PolicyDecision {
    fn translate(contract: SafetyContract) -> Self {
        Self {
            verdict: Verdict::Translate,
            reason: None,
            safety_contract: Some(contract),
        }
    }

    fn skip(reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::Skip,
            reason: Some(reason),
            safety_contract: None,
        }
    }

    fn keep(reason: ReasonCode) -> Self {
        Self {
            verdict: Verdict::KeepOriginal,
            reason: Some(reason),
            safety_contract: None,
        }
    }
}

/// Context-aware policy engine. Stateless; counters live with the caller.
#[derive(Debug, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Classify a candidate. First matching rule wins.
    pub fn classify(&self, candidate: &Candidate) -> PolicyDecision {
        let text = candidate.source_text.trim();

        // Rule 1: nothing worth sending to a translator.
        if text.is_empty()
            || !text.chars().any(|c| c.is_alphabetic())
            || is_all_caps_constant(text)
        {
            return PolicyDecision::skip(ReasonCode::EmptyOrConstant);
        }

        // Rule 2: URLs and emails survive verbatim.
        if url_regex().is_match(text) || email_regex().is_match(text) {
            return PolicyDecision::keep(ReasonCode::UrlOrEmail);
        }

        // Rule 3: programming identifiers and reserved keywords.
        if is_identifier_like(text) || SQL_KEYWORDS.contains(&text.to_lowercase().as_str()) {
            return PolicyDecision::keep(ReasonCode::IdentifierOrKeyword);
        }

        // Rule 4: logic-bearing text (code syntax the placeholder scanner
        // does not recognise as a translatable slot).
        if is_logic_bearing(text) {
            return PolicyDecision::keep(ReasonCode::LogicBearing);
        }

        // Technical fields carry identifiers whatever the value looks like.
        if let Some(field) = candidate.context.field.as_deref() {
            let bare = field.rsplit('.').next().unwrap_or(field);
            if TECHNICAL_FIELDS.contains(&bare) {
                return PolicyDecision::keep(ReasonCode::IdentifierOrKeyword);
            }
        }

        // Layer gate: A conservative, B label-leaning, C permissive.
        let translatable = looks_translatable(text);
        let accept = match candidate.layer {
            Layer::A => translatable,
            Layer::B => candidate.context.data_nature == DataNature::Label || translatable,
            Layer::C => true,
        };

        if accept {
            PolicyDecision::translate(placeholder::scan(text))
        } else {
            PolicyDecision::keep(ReasonCode::AmbiguousToken)
        }
    }

    /// Check a translation against the safety contract of its source.
    ///
    /// Every placeholder must reappear with the same multiplicity.
    /// Reordering is allowed because target languages legitimately move
    /// slots around, but omission, corruption and duplication all fail.
    /// Identifier spans must survive byte-for-byte.
    pub fn validate(&self, original: &str, translated: &str, contract: &SafetyContract) -> bool {
        self.validation_failure(original, translated, contract)
            .is_none()
    }

    /// Like [`validate`](Self::validate), but names the violated rule so
    /// the rejection ledger can carry it.
    pub fn validation_failure(
        &self,
        _original: &str,
        translated: &str,
        contract: &SafetyContract,
    ) -> Option<ReasonCode> {
        let mut expected = contract.placeholders.clone();
        let mut actual = placeholder::placeholders_of(translated);
        expected.sort();
        actual.sort();
        if expected != actual {
            return Some(ReasonCode::PlaceholderMismatch);
        }

        let span_lost = contract
            .identifier_spans
            .iter()
            .any(|span| !translated.contains(span.as_str()));
        if span_lost {
            return Some(ReasonCode::IdentifierAltered);
        }
        None
    }
}

/// Heuristic guard against clearly wrong-script output, e.g. CJK text
/// returned for an Arabic target. Latin-script targets are not checked;
/// there is no cheap signal to distinguish them.
pub fn wrong_script(translated: &str, target_lang: &str) -> bool {
    let base = target_lang
        .split(['-', '_'])
        .next()
        .unwrap_or(target_lang)
        .to_lowercase();

    let expected: &[(u32, u32)] = match base.as_str() {
        "ar" | "fa" | "ur" => ARABIC_RANGES,
        "ru" | "uk" | "bg" => CYRILLIC_RANGES,
        "zh" | "ja" => CJK_RANGES,
        "ko" => HANGUL_RANGES,
        _ => return false,
    };

    let expected_count = count_in_ranges(translated, expected);
    if expected_count > 0 {
        return false;
    }

    let foreign = [ARABIC_RANGES, CYRILLIC_RANGES, CJK_RANGES, HANGUL_RANGES]
        .into_iter()
        .filter(|ranges| *ranges != expected)
        .map(|ranges| count_in_ranges(translated, ranges))
        .sum::<usize>();

    foreign > 0
}

const ARABIC_RANGES: &[(u32, u32)] = &[(0x0600, 0x06FF), (0x0750, 0x077F), (0x08A0, 0x08FF)];
const CYRILLIC_RANGES: &[(u32, u32)] = &[(0x0400, 0x04FF)];
const CJK_RANGES: &[(u32, u32)] = &[(0x4E00, 0x9FFF), (0x3400, 0x4DBF), (0x3040, 0x30FF)];
const HANGUL_RANGES: &[(u32, u32)] = &[(0xAC00, 0xD7AF), (0x1100, 0x11FF)];

fn count_in_ranges(text: &str, ranges: &[(u32, u32)]) -> usize {
    text.chars()
        .filter(|c| {
            let cp = *c as u32;
            ranges.iter().any(|(lo, hi)| cp >= *lo && cp <= *hi)
        })
        .count()
}

fn is_all_caps_constant(text: &str) -> bool {
    let regex = ALL_CAPS.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("regex"));
    text.len() > 1 && regex.is_match(text)
}

fn url_regex() -> &'static Regex {
    URL.get_or_init(|| Regex::new(r"^(?i)[a-z][a-z0-9+.-]*://\S+$").expect("regex"))
}

fn email_regex() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("regex")
    })
}

fn is_identifier_like(text: &str) -> bool {
    if text.len() >= 50 || text.contains(char::is_whitespace) {
        return false;
    }
    let snake = SNAKE_IDENT.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("regex"));
    let camel =
        CAMEL_IDENT.get_or_init(|| Regex::new(r"^[a-z]+(?:[A-Z][A-Za-z0-9]*)+$").expect("regex"));
    let dotted = DOTTED_PATH
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(?:\.[A-Za-z0-9_-]+)+$").expect("regex"));
    snake.is_match(text) || camel.is_match(text) || dotted.is_match(text)
}

fn is_logic_bearing(text: &str) -> bool {
    // Strip the placeholder syntaxes we know how to protect; whatever
    // code-ish structure remains makes the string unsafe to translate.
    let (stripped, _) = placeholder::mask(text);

    if stripped.contains("{%") || stripped.contains("%}") || stripped.contains("${") {
        return true;
    }
    if stripped.contains('{') || stripped.contains('}') {
        return true;
    }
    ["==", "=>", "!=", "<=", ">=", "&&", "||", " = "]
        .iter()
        .any(|op| stripped.contains(op))
}

fn looks_translatable(text: &str) -> bool {
    text.contains(' ')
        || text.chars().any(|c| ".,!?;:".contains(c))
        || text.split_whitespace().count() > 1
}
