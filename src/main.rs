use ai_translate::cache::{TranslationCache, DEFAULT_TTL};
use ai_translate::config::Config;
use ai_translate::extract;
use ai_translate::memory::LanguageMemory;
use ai_translate::orchestrator::Orchestrator;
use ai_translate::profile::{self, ContextProfile};
use ai_translate::storage::TranslationStore;
use ai_translate::translator::LlmTranslator;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ai_translate=info".parse()?),
        )
        .init();

    info!("Starting translation run");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Step 1: Extract candidates from the application's artifacts
    info!("Scanning {} for artifacts", config.app_path.display());
    let artifacts = extract::collect_artifacts(&config.app_path);
    let candidates = extract::extract_all(&artifacts);
    info!(
        "Extracted {} candidates from {} artifacts",
        candidates.len(),
        artifacts.len()
    );

    // Step 2: Load persisted state for the target language
    let store = TranslationStore::open(&config.storage_dir, &config.target_lang)?;
    info!("Loaded {} existing translations", store.len());
    let mut memory = LanguageMemory::load(&config.storage_dir, &config.target_lang)?;
    profile::seed_memory(&mut memory, &store);

    // Step 3: Run the pipeline
    let translator = Arc::new(LlmTranslator::new(
        &config.openai_api_url,
        &config.openai_api_key,
        &config.openai_model,
    )?);
    let cache = TranslationCache::new(&config.cache_dir, DEFAULT_TTL);
    let context_profile = ContextProfile::new(&config.app_name, config.app_context.as_deref());

    let mut orchestrator = Orchestrator::new(
        translator,
        cache,
        store,
        memory,
        context_profile,
        config.run_options(),
    );
    let summary = orchestrator.run(candidates).await?;

    if summary.rejected > 0 {
        info!(
            "{} strings were rejected; see the warnings above for reasons",
            summary.rejected
        );
    }

    Ok(())
}
