//! AI-powered localization pipeline.
//!
//! Extracts user-facing strings from an application's source artifacts and
//! records, decides per string whether it should be machine-translated,
//! skipped or preserved verbatim, sends eligible strings to an external
//! translation provider, and merges accepted results into a persistent
//! per-language translation store without ever damaging existing entries.
//!
//! # Architecture
//!
//! - `extract`: artifact walkers producing candidate strings with context
//! - `policy`: pure classification plus post-translation validation
//! - `placeholder`: safety contracts, anchor masking and restore
//! - `memory` / `profile` / `contract`: accumulated language context and
//!   the request assembly for the provider
//! - `translator`: the external collaborator (LLM-backed and mock)
//! - `cache`: content-addressed memo of provider calls
//! - `storage`: the persisted store and the non-destructive merge
//! - `orchestrator`: the run state machine tying it all together

pub mod cache;
pub mod config;
pub mod contract;
pub mod extract;
pub mod memory;
pub mod orchestrator;
pub mod placeholder;
pub mod policy;
pub mod profile;
pub mod retry;
pub mod sink;
pub mod storage;
pub mod translator;

pub use config::Config;
pub use orchestrator::{Orchestrator, RunOptions, RunState, RunSummary};
pub use policy::{PolicyDecision, PolicyEngine, ReasonCode, Verdict};
pub use storage::{EntryStatus, MergeMode, MergeStats, TranslationEntry, TranslationStore};
pub use translator::{LlmTranslator, MockMode, MockTranslator, TranslationOutcome, Translator};
