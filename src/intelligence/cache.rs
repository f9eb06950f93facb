//! Acquisition result cache — avoid re-fetching a site inside one run.
//!
//! ## LRU eviction
//!
//! When the cache exceeds `capacity`, expired entries are dropped first,
//! then the least-recently-accessed entry. Only successful results are
//! cached; failures always re-fetch.

use crate::acquisition::AcquisitionResult;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    result: AcquisitionResult,
    cached_at: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// In-memory LRU+TTL cache keyed by request URL.
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: Mutex<CacheStats>,
    capacity: usize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            capacity,
            ttl,
        }
    }

    /// Fresh cached result for the URL, if any.
    pub fn get(&self, url: &str) -> Option<AcquisitionResult> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let hit = match entries.get_mut(url) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                entry.last_accessed = Instant::now();
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        };
        drop(entries);

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Cache a result. Failures are ignored — they must re-fetch.
    pub fn put(&self, url: &str, result: &AcquisitionResult) {
        if !result.success {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity && !entries.contains_key(url) {
            self.evict_one(&mut entries);
        }
        entries.insert(
            url.to_string(),
            CacheEntry {
                result: result.clone(),
                cached_at: Instant::now(),
                last_accessed: Instant::now(),
            },
        );
    }

    /// Drop expired entries first; otherwise the least-recently-used one.
    fn evict_one(&self, entries: &mut HashMap<String, CacheEntry>) {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(self.ttl))
            .map(|(k, _)| k.clone())
            .collect();

        let evicted = if expired.is_empty() {
            entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
                .map(|k| {
                    entries.remove(&k);
                    1
                })
                .unwrap_or(0)
        } else {
            let n = expired.len() as u64;
            for k in expired {
                entries.remove(&k);
            }
            n
        };

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.evictions += evicted;
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = *self.stats.lock().unwrap_or_else(|e| e.into_inner());
        snapshot.entries = entries.len();
        snapshot
    }
}
