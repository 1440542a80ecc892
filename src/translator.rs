//! Translator collaborator: provider trait, LLM-backed implementation and
//! a deterministic mock.
//!
//! The core treats the provider as an opaque function from a batch of
//! strings (plus a [`TranslationContract`]) to per-item outcomes, with no
//! guarantee beyond positional correspondence. Mixed success/failure in
//! one response is expected and handled. The LLM provider masks
//! placeholders with anchor tokens before the call and restores them
//! after, so the model never gets a chance to corrupt them.

use crate::contract::TranslationContract;
use crate::placeholder;
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("translation API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("translator misconfigured: {0}")]
    Config(String),
}

impl TranslateError {
    /// Quota pressure and server faults are worth retrying; bad
    /// credentials and unparsable responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslateError::Network(_) => true,
            TranslateError::Api { status, .. } => *status == 429 || *status >= 500,
            TranslateError::MalformedResponse(_) | TranslateError::Config(_) => false,
        }
    }
}

/// Per-item result of a batch call. Positionally aligned with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    /// The provider could not translate this item; the reason is carried
    /// into the rejection ledger.
    Failed(String),
}

/// External translation collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate a batch. The output has exactly one outcome per input
    /// text, in input order.
    async fn translate_batch(
        &self,
        texts: &[String],
        contract: &TranslationContract,
    ) -> Result<Vec<TranslationOutcome>, TranslateError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// LLM-backed provider
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Chat-completions provider. The endpoint URL is injectable so tests can
/// point it at a local mock server.
pub struct LlmTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl LlmTranslator {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self, TranslateError> {
        if api_key.trim().is_empty() {
            return Err(TranslateError::Config("API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(TranslateError::Network)?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            retry: RetryConfig::translation_batch(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn request_chat(&self, system: &str, user: &str) -> Result<String, TranslateError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: 2000,
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Api { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslateError::MalformedResponse("response had no choices".to_string()))
    }
}

impl std::fmt::Debug for LlmTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTranslator")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        contract: &TranslationContract,
    ) -> Result<Vec<TranslationOutcome>, TranslateError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Mask placeholders per text so the model cannot translate or
        // mangle them; restored per item below.
        let mut masked_texts = Vec::with_capacity(texts.len());
        let mut maps = Vec::with_capacity(texts.len());
        for text in texts {
            let (masked, map) = placeholder::mask(text);
            masked_texts.push(masked);
            maps.push(map);
        }

        let system = contract.system_prompt();
        let user = contract.user_prompt(&masked_texts);

        let content = with_retry_if(
            &self.retry,
            "translate_batch",
            || self.request_chat(&system, &user),
            TranslateError::is_retryable,
        )
        .await?;

        let parsed = parse_batch_response(&content, texts.len()).ok_or_else(|| {
            TranslateError::MalformedResponse(format!(
                "could not align response with {} inputs",
                texts.len()
            ))
        })?;

        let outcomes = parsed
            .into_iter()
            .zip(&maps)
            .map(|(item, map)| match item {
                None => TranslationOutcome::Failed("provider returned no translation".to_string()),
                Some(raw) => {
                    let restored = placeholder::restore(&raw, map);
                    if placeholder::has_leftover_anchors(&restored) {
                        TranslationOutcome::Failed("anchor tokens leaked through".to_string())
                    } else {
                        TranslationOutcome::Translated(restored)
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn name(&self) -> &str {
        "LLM Translator"
    }
}

/// Parse a batch response into one slot per input.
///
/// The contract asks for a JSON array (nulls mark per-item failures), but
/// models drift, so numbered or plain newline-separated lines are
/// accepted as a fallback. Returns `None` when the response cannot be
/// aligned with the inputs at all.
fn parse_batch_response(content: &str, expected: usize) -> Option<Vec<Option<String>>> {
    let trimmed = strip_code_fences(content.trim());

    if trimmed.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            if items.len() == expected {
                return Some(
                    items
                        .into_iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => Some(s.trim().to_string()),
                            _ => None,
                        })
                        .collect(),
                );
            }
            debug!(
                "JSON response had {} items, expected {}",
                items.len(),
                expected
            );
        }
    }

    // Fallback: one translation per line, possibly numbered, with any
    // echoed instruction lines filtered out.
    let lines: Vec<String> = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_instruction_line(line))
        .map(strip_number_prefix)
        .collect();

    if lines.len() >= expected {
        if lines.len() > expected {
            warn!(
                "Response had {} lines for {} inputs; taking the first {}",
                lines.len(),
                expected,
                expected
            );
        }
        return Some(lines.into_iter().take(expected).map(Some).collect());
    }
    None
}

fn strip_code_fences(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest).trim()
}

fn is_instruction_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["translations:", "translation:", "rules:", "important:", "here are"]
        .iter()
        .any(|marker| lower.starts_with(marker))
}

fn strip_number_prefix(line: &str) -> String {
    let Some((prefix, rest)) = line.split_once(". ") else {
        return line.to_string();
    };
    if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
        rest.to_string()
    } else {
        line.to_string()
    }
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

/// Behaviors for [`MockTranslator`].
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append the target language: "hello" → "hello [ar]". Preserves
    /// placeholders, so validation passes.
    Suffix,
    /// Look up predefined source → translation mappings; unmapped texts
    /// fall back to suffix behavior.
    Mappings(HashMap<String, String>),
    /// Per-item failure for texts containing any of the given fragments;
    /// everything else translates with the suffix behavior.
    FailMatching(Vec<String>),
    /// The whole batch call fails with a server error.
    Error(String),
    /// Return every input unchanged.
    NoOp,
}

/// Deterministic, API-free translator for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockTranslator {
    mode: MockMode,
}

impl MockTranslator {
    pub fn new(mode: MockMode) -> Self {
        Self { mode }
    }

    fn suffix(text: &str, target_lang: &str) -> String {
        format!("{} [{}]", text, target_lang)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        contract: &TranslationContract,
    ) -> Result<Vec<TranslationOutcome>, TranslateError> {
        match &self.mode {
            MockMode::Error(msg) => Err(TranslateError::Api {
                status: 503,
                body: msg.clone(),
            }),
            MockMode::Suffix => Ok(texts
                .iter()
                .map(|t| TranslationOutcome::Translated(Self::suffix(t, &contract.target_lang)))
                .collect()),
            MockMode::Mappings(map) => Ok(texts
                .iter()
                .map(|t| {
                    let translated = map
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| Self::suffix(t, &contract.target_lang));
                    TranslationOutcome::Translated(translated)
                })
                .collect()),
            MockMode::FailMatching(fragments) => Ok(texts
                .iter()
                .map(|t| {
                    if fragments.iter().any(|f| t.contains(f)) {
                        TranslationOutcome::Failed("scripted failure".to_string())
                    } else {
                        TranslationOutcome::Translated(Self::suffix(t, &contract.target_lang))
                    }
                })
                .collect()),
            MockMode::NoOp => Ok(texts
                .iter()
                .map(|t| TranslationOutcome::Translated(t.clone()))
                .collect()),
        }
    }

    fn name(&self) -> &str {
        "Mock Translator"
    }
}
