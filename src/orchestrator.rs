//! Orchestrator: drives the decision-and-merge pipeline end to end.
//!
//! One run moves through COLLECTING → CLASSIFYING → DEDUPING → BATCHING →
//! AWAITING_RESULTS → VALIDATING → MERGING → DONE. Classification strips
//! skip/keep candidates into the rejection ledger, survivors are deduped
//! and checked against the persisted store and the cache, and only the
//! remainder is batched out to the external translator. Every returned
//! result, cache hits included, is re-validated against its safety
//! contract before it may touch the store, and the store itself is only
//! committed atomically at the end of a successful merge.

use crate::cache::{fingerprint, TranslationCache};
use crate::contract::{build_contract, TranslationContract};
use crate::extract::Candidate;
use crate::memory::{context_kind, LanguageMemory, TermRecord};
use crate::placeholder::SafetyContract;
use crate::policy::{wrong_script, PolicyEngine, ReasonCode, Verdict};
use crate::profile::ContextProfile;
use crate::sink::{SinkRecord, TranslationSink};
use crate::storage::{EntryStatus, MergeMode, MergeStats, TranslationEntry, TranslationStore};
use crate::translator::{TranslationOutcome, Translator};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pipeline states, in order. ERROR is terminal and reachable from any
/// step on an unrecoverable fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Collecting,
    Classifying,
    Deduping,
    Batching,
    AwaitingResults,
    Validating,
    Merging,
    Done,
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Collecting => "COLLECTING",
            RunState::Classifying => "CLASSIFYING",
            RunState::Deduping => "DEDUPING",
            RunState::Batching => "BATCHING",
            RunState::AwaitingResults => "AWAITING_RESULTS",
            RunState::Validating => "VALIDATING",
            RunState::Merging => "MERGING",
            RunState::Done => "DONE",
            RunState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Per-run knobs, resolved from configuration by the caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source_lang: String,
    pub target_lang: String,
    /// Strings per external call; clamped to 10..=50.
    pub batch_size: usize,
    /// Concurrent in-flight batches when slow mode is off.
    pub max_concurrent_batches: usize,
    /// Serialize calls and sleep between them to respect rate limits.
    pub slow_mode: bool,
    pub slow_mode_delay: Duration,
    /// Re-send strings that already have a stored translation.
    pub force_retranslate: bool,
    pub merge_mode: MergeMode,
    /// Classify and translate but commit nothing.
    pub dry_run: bool,
    /// Directory holding the per-language memory documents.
    pub memory_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            source_lang: "en".to_string(),
            target_lang: "ar".to_string(),
            batch_size: 30,
            max_concurrent_batches: 4,
            slow_mode: false,
            slow_mode_delay: Duration::from_millis(500),
            force_retranslate: false,
            merge_mode: MergeMode::AddMissingOnly,
            dry_run: false,
            memory_dir: PathBuf::from("."),
        }
    }
}

impl RunOptions {
    fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(10, 50)
    }
}

/// One entry of the rejection ledger.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub source_text: String,
    pub reason: ReasonCode,
    pub detail: Option<String>,
    pub location: String,
}

/// Counts per outcome category for one run, plus the rejection ledger.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub candidates: usize,
    pub translated: usize,
    pub skipped: usize,
    pub kept_original: usize,
    pub already_translated: usize,
    pub cache_hits: usize,
    pub needs_review: usize,
    pub rejected: usize,
    pub merge: MergeStats,
    pub ledger: Vec<Rejection>,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            "Run complete: {} candidates → {} translated, {} skipped, {} kept original, \
             {} already translated, {} cache hits, {} needs review, {} rejected",
            self.candidates,
            self.translated,
            self.skipped,
            self.kept_original,
            self.already_translated,
            self.cache_hits,
            self.needs_review,
            self.rejected
        );
        info!(
            "Merge: {} added, {} updated, {} left untouched",
            self.merge.added, self.merge.updated, self.merge.left_untouched
        );
    }
}

/// A candidate that survived classification, with its safety contract.
#[derive(Debug, Clone)]
struct WorkItem {
    candidate: Candidate,
    contract: SafetyContract,
}

/// Owns the request/response lifecycle for a single run.
pub struct Orchestrator {
    policy: PolicyEngine,
    translator: Arc<dyn Translator>,
    cache: TranslationCache,
    store: TranslationStore,
    memory: LanguageMemory,
    profile: ContextProfile,
    sink: Option<Box<dyn TranslationSink>>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: TranslationCache,
        store: TranslationStore,
        memory: LanguageMemory,
        profile: ContextProfile,
        options: RunOptions,
    ) -> Self {
        Self {
            policy: PolicyEngine::new(),
            translator,
            cache,
            store,
            memory,
            profile,
            sink: None,
            options,
        }
    }

    /// Attach a translation-record sink; accepted results are upserted
    /// through it in addition to the store.
    pub fn with_sink(mut self, sink: Box<dyn TranslationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn store(&self) -> &TranslationStore {
        &self.store
    }

    fn transition(&self, state: RunState) {
        debug!("state → {}", state);
    }

    /// Run the pipeline over the collected candidates.
    pub async fn run(&mut self, candidates: Vec<Candidate>) -> Result<RunSummary> {
        let mut summary = RunSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        self.transition(RunState::Collecting);
        info!(
            "Processing {} candidates for {} with {}",
            candidates.len(),
            self.options.target_lang,
            self.translator.name()
        );

        self.transition(RunState::Classifying);
        let work = self.classify(candidates, &mut summary);

        self.transition(RunState::Deduping);
        let work = self.dedup_and_filter(work, &mut summary);

        // Cache pass: hits skip the external call but never validation.
        let mut entries: Vec<TranslationEntry> = Vec::new();
        let mut pending: Vec<WorkItem> = Vec::new();
        for item in work {
            match self.cache_lookup(&item) {
                Some(translated) => {
                    summary.cache_hits += 1;
                    self.finalize(&item, translated, &mut summary, &mut entries);
                }
                None => pending.push(item),
            }
        }

        self.transition(RunState::Batching);
        let batches = self.build_batches(pending);
        info!(
            "{} strings to translate in {} batches",
            batches.iter().map(|(items, _)| items.len()).sum::<usize>(),
            batches.len()
        );

        self.transition(RunState::AwaitingResults);
        let results = self.dispatch(batches).await;

        self.transition(RunState::Validating);
        for (item, outcome) in results {
            match outcome {
                TranslationOutcome::Translated(translated) => {
                    self.finalize(&item, translated, &mut summary, &mut entries);
                }
                TranslationOutcome::Failed(detail) => {
                    self.reject(
                        &item,
                        ReasonCode::ExternalFailure,
                        Some(detail),
                        &mut summary,
                    );
                }
            }
        }

        self.transition(RunState::Merging);
        summary.merge = self.store.apply_merge(&entries, self.options.merge_mode);
        crate::storage::log_merge(&summary.merge, self.options.merge_mode);

        if self.options.dry_run {
            info!("Dry run: store and memory left untouched");
        } else {
            // Only rewrite the store when the merge changed something, so
            // an unchanged source set leaves the file byte-identical.
            if summary.merge.changed() > 0 {
                if let Err(e) = self.store.commit() {
                    self.transition(RunState::Error);
                    return Err(e).context("Failed to commit translation store");
                }
            }
            if !entries.is_empty() {
                if let Err(e) = self.memory.save(&self.options.memory_dir) {
                    self.transition(RunState::Error);
                    return Err(e).context("Failed to commit language memory");
                }
            }
        }

        self.transition(RunState::Done);
        summary.log();
        Ok(summary)
    }

    fn classify(&self, candidates: Vec<Candidate>, summary: &mut RunSummary) -> Vec<WorkItem> {
        let mut work = Vec::new();
        for candidate in candidates {
            let decision = self.policy.classify(&candidate);
            match decision.verdict {
                Verdict::Skip => {
                    summary.skipped += 1;
                    summary.ledger.push(Rejection {
                        source_text: candidate.source_text,
                        reason: decision.reason.unwrap_or(ReasonCode::EmptyOrConstant),
                        detail: None,
                        location: candidate.location.to_string(),
                    });
                }
                Verdict::KeepOriginal => {
                    summary.kept_original += 1;
                    summary.ledger.push(Rejection {
                        source_text: candidate.source_text,
                        reason: decision.reason.unwrap_or(ReasonCode::IdentifierOrKeyword),
                        detail: None,
                        location: candidate.location.to_string(),
                    });
                }
                Verdict::Translate => work.push(WorkItem {
                    contract: decision.safety_contract.unwrap_or_default(),
                    candidate,
                }),
            }
        }
        work
    }

    fn dedup_and_filter(&self, work: Vec<WorkItem>, summary: &mut RunSummary) -> Vec<WorkItem> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for item in work {
            let normalized = normalize_text(&item.candidate.source_text);
            if !seen.insert(normalized) {
                continue;
            }
            if !self.options.force_retranslate && self.store.contains(&item.candidate.source_text)
            {
                summary.already_translated += 1;
                continue;
            }
            kept.push(item);
        }
        kept
    }

    fn cache_key(&self, item: &WorkItem) -> String {
        fingerprint(
            &item.candidate.source_text,
            &item.candidate.context.signature(),
            &self.options.target_lang,
        )
    }

    fn cache_lookup(&self, item: &WorkItem) -> Option<String> {
        self.cache.get(&self.cache_key(item))
    }

    /// Group pending items into batches and pre-build each batch's
    /// translation contract (terminology subset, style, examples).
    fn build_batches(&self, pending: Vec<WorkItem>) -> Vec<(Vec<WorkItem>, TranslationContract)> {
        let size = self.options.effective_batch_size();
        pending
            .chunks(size)
            .map(|chunk| {
                let texts: Vec<String> = chunk
                    .iter()
                    .map(|item| item.candidate.source_text.clone())
                    .collect();
                // The dominant context kind steers style and examples.
                let kind = context_kind(&chunk[0].candidate.context);
                let contract = build_contract(
                    &self.memory,
                    &self.profile,
                    &texts,
                    kind,
                    &self.options.source_lang,
                    &self.options.target_lang,
                );
                (chunk.to_vec(), contract)
            })
            .collect()
    }

    /// Dispatch all batches: serialized with a fixed delay in slow mode,
    /// otherwise concurrently up to the configured limit, with input
    /// order preserved either way.
    async fn dispatch(
        &self,
        batches: Vec<(Vec<WorkItem>, TranslationContract)>,
    ) -> Vec<(WorkItem, TranslationOutcome)> {
        if self.options.slow_mode {
            let mut results = Vec::new();
            let total = batches.len();
            for (i, (items, contract)) in batches.into_iter().enumerate() {
                results.extend(
                    translate_with_split(self.translator.clone(), items, contract).await,
                );
                if i + 1 < total {
                    tokio::time::sleep(self.options.slow_mode_delay).await;
                }
            }
            results
        } else {
            let translator = self.translator.clone();
            stream::iter(batches.into_iter().map(move |(items, contract)| {
                translate_with_split(translator.clone(), items, contract)
            }))
            .buffered(self.options.max_concurrent_batches.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
        }
    }

    /// Validate one translated result and, if it survives, stage it for
    /// the merge, update memory and cache, and push it to the sink.
    fn finalize(
        &mut self,
        item: &WorkItem,
        translated: String,
        summary: &mut RunSummary,
        entries: &mut Vec<TranslationEntry>,
    ) {
        let source = &item.candidate.source_text;

        if let Some(reason) = self
            .policy
            .validation_failure(source, &translated, &item.contract)
        {
            self.reject(item, reason, None, summary);
            return;
        }
        if wrong_script(&translated, &self.options.target_lang) {
            self.reject(item, ReasonCode::WrongScript, None, summary);
            return;
        }

        let kind = context_kind(&item.candidate.context);
        let mut status = EntryStatus::Accepted;
        let mut detail = None;

        if let Some(violation) = self.memory.check_consistency(source, &translated) {
            status = EntryStatus::NeedsReview;
            detail = Some(violation);
        } else if let TermRecord::Conflict { existing } =
            self.memory.record_accepted(source, &translated, kind, 0.95)
        {
            status = EntryStatus::NeedsReview;
            detail = Some(format!("memory prefers '{}'", existing));
        }

        // The provider's answer is memoized whatever the review outcome;
        // revalidation runs again on every hit.
        self.cache.set(&self.cache_key(item), &translated);

        match status {
            EntryStatus::Accepted => {
                summary.translated += 1;
                if !self.options.dry_run {
                    if let Some(sink) = self.sink.as_mut() {
                        let record = SinkRecord {
                            source_text: source.clone(),
                            translated_text: translated.clone(),
                            language: self.options.target_lang.clone(),
                            context_tag: item.candidate.context.signature(),
                        };
                        if let Err(e) = sink.upsert(record) {
                            warn!("Translation sink upsert failed: {}", e);
                        }
                    }
                }
            }
            EntryStatus::NeedsReview => {
                summary.needs_review += 1;
                debug!(
                    "Needs review: '{}' ({})",
                    source,
                    detail.as_deref().unwrap_or("unspecified")
                );
            }
            EntryStatus::Rejected => unreachable!("rejects never reach finalize"),
        }

        entries.push(
            TranslationEntry::accepted(source, &translated, item.candidate.context.clone())
                .with_status(status),
        );
    }

    fn reject(
        &self,
        item: &WorkItem,
        reason: ReasonCode,
        detail: Option<String>,
        summary: &mut RunSummary,
    ) {
        summary.rejected += 1;
        warn!(
            "Rejected '{}': {}{}",
            item.candidate.source_text,
            reason,
            detail
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        );
        summary.ledger.push(Rejection {
            source_text: item.candidate.source_text.clone(),
            reason,
            detail,
            location: item.candidate.location.to_string(),
        });
    }
}

/// Translate one batch, re-splitting on whole-batch failure.
///
/// The provider already retries transient faults internally; a batch that
/// still fails is halved and each half retried, so one poisoned string
/// (or one mis-aligned response) cannot take down its neighbours. Single
/// strings that keep failing come back as `Failed` outcomes and the run
/// continues.
async fn translate_with_split(
    translator: Arc<dyn Translator>,
    items: Vec<WorkItem>,
    contract: TranslationContract,
) -> Vec<(WorkItem, TranslationOutcome)> {
    let texts: Vec<String> = items
        .iter()
        .map(|item| item.candidate.source_text.clone())
        .collect();

    let mut outcomes: Vec<Option<TranslationOutcome>> = vec![None; items.len()];
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    queue.push_back((0, items.len()));

    while let Some((start, end)) = queue.pop_front() {
        let slice = &texts[start..end];
        match translator.translate_batch(slice, &contract).await {
            Ok(batch_outcomes) if batch_outcomes.len() == slice.len() => {
                for (offset, outcome) in batch_outcomes.into_iter().enumerate() {
                    outcomes[start + offset] = Some(outcome);
                }
            }
            Ok(batch_outcomes) => {
                warn!(
                    "Provider returned {} outcomes for {} inputs; failing the sub-batch",
                    batch_outcomes.len(),
                    slice.len()
                );
                for slot in outcomes.iter_mut().take(end).skip(start) {
                    *slot = Some(TranslationOutcome::Failed(
                        "provider response misaligned".to_string(),
                    ));
                }
            }
            Err(e) if end - start > 1 => {
                let mid = start + (end - start) / 2;
                warn!(
                    "Batch of {} failed ({}); splitting and retrying",
                    end - start,
                    e
                );
                queue.push_back((start, mid));
                queue.push_back((mid, end));
            }
            Err(e) => {
                outcomes[start] = Some(TranslationOutcome::Failed(e.to_string()));
            }
        }
    }

    items
        .into_iter()
        .zip(outcomes)
        .map(|(item, outcome)| {
            let outcome = outcome
                .unwrap_or_else(|| TranslationOutcome::Failed("never dispatched".to_string()));
            (item, outcome)
        })
        .collect()
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
