//! Translation contract builder.
//!
//! Combines the application context profile, the language memory
//! (terminology relevant to the batch, style guidance, recent example
//! pairs) and the placeholder-preservation rules into the request sent to
//! the external translator. The contract renders the system and user
//! prompts; the provider decides nothing about content.

use crate::memory::LanguageMemory;
use crate::profile::ContextProfile;

/// Maximum example pairs included as few-shot context.
const MAX_PROMPT_EXAMPLES: usize = 3;

/// Everything the external translator needs to know about one batch.
#[derive(Debug, Clone)]
pub struct TranslationContract {
    pub source_lang: String,
    pub target_lang: String,
    pub context_kind: String,
    pub style: String,
    pub app_context: Option<String>,
    /// (source term, required translation) pairs relevant to the batch.
    pub terminology: Vec<(String, String)>,
    /// Recent accepted (source, translation) pairs of the same kind.
    pub examples: Vec<(String, String)>,
}

/// Assemble the contract for one batch of texts.
pub fn build_contract(
    memory: &LanguageMemory,
    profile: &ContextProfile,
    batch_texts: &[String],
    context_kind: &str,
    source_lang: &str,
    target_lang: &str,
) -> TranslationContract {
    TranslationContract {
        source_lang: source_lang.to_string(),
        target_lang: target_lang.to_string(),
        context_kind: context_kind.to_string(),
        style: memory.style_for(context_kind).to_string(),
        app_context: profile.describe(),
        terminology: relevant_terminology(memory, batch_texts),
        examples: memory
            .examples_for(Some(context_kind), MAX_PROMPT_EXAMPLES)
            .into_iter()
            .map(|pair| (pair.source.clone(), pair.translated.clone()))
            .collect(),
    }
}

/// Terminology entries whose source term actually occurs in the batch.
fn relevant_terminology(memory: &LanguageMemory, batch_texts: &[String]) -> Vec<(String, String)> {
    let mut relevant = Vec::new();
    for (term, translation) in memory.terminology() {
        let mentioned = batch_texts.iter().any(|text| {
            text.split_whitespace()
                .map(|w| w.trim_matches(|c: char| ".,!?;:".contains(c)))
                .any(|w| w == term)
        });
        if mentioned {
            relevant.push((term.clone(), translation.clone()));
        }
    }
    relevant
}

impl TranslationContract {
    /// System prompt carrying the rules and accumulated context.
    pub fn system_prompt(&self) -> String {
        let mut sections = Vec::new();

        sections.push(format!(
            "You are a professional translator. Translate user interface text \
             from {} to {}.",
            self.source_lang, self.target_lang
        ));

        if let Some(app) = &self.app_context {
            sections.push(format!(
                "Context: the texts belong to {}. Translate according to meaning \
                 and domain, not literally.",
                app
            ));
        }

        if !self.terminology.is_empty() {
            let mut lines = vec!["Terminology (use these translations consistently):".to_string()];
            for (term, translation) in &self.terminology {
                lines.push(format!("  - {} → {}", term, translation));
            }
            sections.push(lines.join("\n"));
        }

        sections.push(format!(
            "Style ({}, {}): {}",
            self.context_kind,
            self.style,
            style_guidance(&self.style)
        ));

        if !self.examples.is_empty() {
            let mut lines = vec!["Examples (follow this style and terminology):".to_string()];
            for (source, translated) in &self.examples {
                lines.push(format!("  - {} → {}", source, translated));
            }
            sections.push(lines.join("\n"));
        }

        sections.push(
            "Rules:\n\
             - Preserve ALL placeholders exactly as they appear (e.g., {0}, %(name)s, {{ var }})\n\
             - Do NOT translate technical terms, code, URLs, or email addresses\n\
             - Keep the same formatting and structure\n\
             - Translate according to meaning and context, not word-by-word\n\
             - Return ONLY a JSON array of strings, one element per input text, in the same order"
                .to_string(),
        );

        sections.join("\n\n")
    }

    /// User prompt: the numbered batch.
    pub fn user_prompt(&self, texts: &[String]) -> String {
        let numbered = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Translate the following {} texts from {} to {}:\n\n{}",
            texts.len(),
            self.source_lang,
            self.target_lang,
            numbered
        )
    }
}

fn style_guidance(style: &str) -> &'static str {
    match style {
        "formal" => "Use formal language with a respectful tone. Avoid casual expressions.",
        "informal" => "Use friendly, casual language. Be approachable and conversational.",
        _ => "Use professional, balanced language. Neither too formal nor too casual.",
    }
}
