//! Content-addressed memo of external translation calls.
//!
//! Keys are fingerprints of (source text, context signature, target
//! language); values live one JSON file per entry under the cache
//! directory. The cache is purely advisory: a miss or a corrupt entry
//! costs at worst a redundant external call, and hits are always
//! re-validated against their safety contract before use; the cache is
//! never authoritative over the persisted store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default entry lifetime: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    translated_text: String,
    created_at: i64,
    ttl_secs: u64,
}

/// Compute the cache key for one candidate / target-language pair.
pub fn fingerprint(source_text: &str, context_signature: &str, target_lang: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_text.as_bytes());
    hasher.update(b"|");
    hasher.update(context_signature.as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Disk-backed translation cache. All failures degrade to a miss.
#[derive(Debug)]
pub struct TranslationCache {
    dir: PathBuf,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(dir: &Path, ttl: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ttl,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Fetch a cached translation. Expired or unreadable entries are
    /// treated as misses (and expired files removed opportunistically).
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding corrupt cache entry {}: {}", path.display(), e);
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };
        let age = Utc::now().timestamp().saturating_sub(record.created_at);
        if age < 0 || age as u64 > record.ttl_secs {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        Some(record.translated_text)
    }

    /// Store a translation. Write failures are logged and swallowed; the
    /// cache must never block the pipeline.
    pub fn set(&self, key: &str, translated_text: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("Cannot create cache directory {}: {}", self.dir.display(), e);
            return;
        }
        let record = CacheRecord {
            translated_text: translated_text.to_string(),
            created_at: Utc::now().timestamp(),
            ttl_secs: self.ttl.as_secs(),
        };
        let path = self.entry_path(key);
        match serde_json::to_string(&record) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&path, body) {
                    warn!("Failed to write cache entry {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize cache entry: {}", e),
        }
    }

    /// Remove every cache entry. Safe to call at any time; the cache is
    /// derived data and rebuilds itself.
    pub fn clear(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
