//! Content-addressed result cache with single-flight computation.
//!
//! Keys hash the document content plus the analysis kind and the
//! provider lineup, so a configuration change never serves stale
//! results. Concurrent requests for the same key share one computation
//! through a per-key async lock. Failed computations commit nothing.
//! The cache is bounded: expired entries are purged as they are seen
//! and the oldest entry is evicted once the capacity is reached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AnalysisError;
use crate::models::{AnalysisKind, AnalysisResult};
use crate::providers::ProviderKind;

const DEFAULT_CAPACITY: usize = 1024;

struct CacheEntry {
    result: Arc<AnalysisResult>,
    inserted_at: Instant,
}

pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    /// None means entries never expire.
    ttl: Option<Duration>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, ttl)
    }

    pub fn with_capacity(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return the cached result for `key`, or run `compute` and cache
    /// its output. Concurrent callers with the same key wait for the
    /// first computation instead of repeating it. Cancellation and
    /// request validation errors pass through unwrapped; any other
    /// failure is reported as [`AnalysisError::CacheCompute`].
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<Arc<AnalysisResult>, AnalysisError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AnalysisResult, AnalysisError>>,
    {
        if let Some(result) = self.get(key) {
            return Ok(result);
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        // A concurrent caller may have filled the entry while this one
        // waited on the lock.
        if let Some(result) = self.get(key) {
            return Ok(result);
        }

        debug!("cache miss, computing result for key {}", key.get(..16).unwrap_or(key));
        let result = match compute().await {
            Ok(result) => Arc::new(result),
            Err(err @ (AnalysisError::Cancelled | AnalysisError::InvalidRequest(_))) => {
                return Err(err);
            }
            Err(err) => return Err(AnalysisError::CacheCompute(Box::new(err))),
        };

        self.insert(key, Arc::clone(&result));

        // The committed entry now answers this key; waiters holding a
        // clone of the lock finish through their re-check, and later
        // callers no longer need the lock at all.
        if let Ok(mut locks) = self.locks.write() {
            locks.remove(key);
        }

        Ok(result)
    }

    /// Look up `key`, removing the entry if its TTL has lapsed.
    pub fn get(&self, key: &str) -> Option<Arc<AnalysisResult>> {
        {
            let entries = self.entries.read().ok()?;
            let entry = entries.get(key)?;
            match self.ttl {
                Some(ttl) if entry.inserted_at.elapsed() > ttl => {}
                _ => return Some(Arc::clone(&entry.result)),
            }
        }
        if let Ok(mut entries) = self.entries.write() {
            if let Some(ttl) = self.ttl {
                if entries
                    .get(key)
                    .is_some_and(|entry| entry.inserted_at.elapsed() > ttl)
                {
                    entries.remove(key);
                }
            }
        }
        None
    }

    fn insert(&self, key: &str, result: Arc<AnalysisResult>) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ttl) = self.ttl {
            entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        }
        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => entries.remove(&key),
                None => break,
            };
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry and the per-key locks.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        if let Ok(mut locks) = self.locks.write() {
            locks.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        if let Ok(locks) = self.locks.read() {
            if let Some(lock) = locks.get(key) {
                return Arc::clone(lock);
            }
        }
        let mut locks = match self.locks.write() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Cache key for a document analysis: sha256 of the content plus the
/// analysis kind plus the sorted provider lineup.
pub fn cache_key(content: &str, kind: AnalysisKind, providers: &[ProviderKind]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(kind.as_str().as_bytes());

    let mut names: Vec<&str> = providers.iter().map(|p| p.as_str()).collect();
    names.sort_unstable();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(b",");
    }

    hex::encode(hasher.finalize())
}
