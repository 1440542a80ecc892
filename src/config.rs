use crate::orchestrator::RunOptions;
use crate::storage::MergeMode;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Translation provider (OpenAI-compatible chat completions)
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,

    // Languages
    pub source_lang: String,
    pub target_lang: String,

    // Application under translation
    pub app_name: String,
    pub app_path: PathBuf,
    pub app_context: Option<String>,

    // Storage
    pub storage_dir: PathBuf,
    pub cache_dir: PathBuf,

    // Pipeline behavior
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub slow_mode: bool,
    pub force_retranslate: bool,
    pub update_existing: bool,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Provider
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY not set")?,
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            // Languages
            source_lang: std::env::var("SOURCE_LANG").unwrap_or_else(|_| "en".to_string()),
            target_lang: std::env::var("TARGET_LANG").context("TARGET_LANG not set")?,

            // Application
            app_name: std::env::var("APP_NAME").context("APP_NAME not set")?,
            app_path: std::env::var("APP_PATH")
                .context("APP_PATH not set")?
                .into(),
            app_context: std::env::var("APP_CONTEXT").ok(),

            // Storage
            storage_dir: std::env::var("STORAGE_DIR")
                .unwrap_or_else(|_| "translations".to_string())
                .into(),
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| ".cache/ai-translate".to_string())
                .into(),

            // Behavior
            batch_size: parse_env("BATCH_SIZE", 30),
            max_concurrent_batches: parse_env("MAX_CONCURRENT_BATCHES", 4),
            slow_mode: flag_env("SLOW_MODE"),
            force_retranslate: flag_env("FORCE_RETRANSLATE"),
            update_existing: flag_env("UPDATE_EXISTING"),
            dry_run: flag_env("DRY_RUN"),
        })
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            batch_size: self.batch_size,
            max_concurrent_batches: self.max_concurrent_batches,
            slow_mode: self.slow_mode,
            slow_mode_delay: Duration::from_millis(500),
            force_retranslate: self.force_retranslate,
            merge_mode: if self.update_existing {
                MergeMode::UpdateExisting
            } else {
                MergeMode::AddMissingOnly
            },
            dry_run: self.dry_run,
            memory_dir: self.storage_dir.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
