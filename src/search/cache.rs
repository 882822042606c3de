// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TTL-based search result caching
//!
//! One global cache keyed by the normalized query, so a result served by any
//! provider satisfies later identical queries. Expiry is checked lazily on
//! read and total size is bounded with LRU eviction.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::types::SearchResult;

struct CacheEntry {
    results: Vec<SearchResult>,
    provider: String,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Results copied out of a cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResults {
    pub results: Vec<SearchResult>,
    /// Provider that originally served the results
    pub provider: String,
    /// Time left before the entry expires
    pub remaining_ttl: Duration,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped for expiry or LRU pressure
    pub evictions: u64,
    /// Entries currently stored (expired ones included until touched)
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded LRU cache of search results with per-entry TTL
pub struct SearchCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl SearchCache {
    /// Create a cache holding at most `max_entries` queries
    ///
    /// A zero capacity is bumped to one entry.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
        }
    }

    /// Get cached results for a normalized key
    ///
    /// Returns None if absent or expired. Expired entries are removed.
    pub fn get(&self, key: &str) -> Option<CachedResults> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<CachedResults> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let cached = inner.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(CachedResults {
                    results: entry.results.clone(),
                    provider: entry.provider.clone(),
                    remaining_ttl: entry.ttl - now.saturating_duration_since(entry.created_at),
                })
            }
        });

        match cached {
            Some(Some(hit)) => {
                inner.hits += 1;
                Some(hit)
            }
            Some(None) => {
                inner.entries.pop(key);
                inner.evictions += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store results for a normalized key, replacing any previous entry
    pub fn put(&self, key: &str, results: &[SearchResult], provider: &str, ttl: Duration) {
        self.put_at(key, results, provider, ttl, Instant::now());
    }

    pub fn put_at(
        &self,
        key: &str,
        results: &[SearchResult],
        provider: &str,
        ttl: Duration,
        now: Instant,
    ) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let entry = CacheEntry {
            results: results.to_vec(),
            provider: provider.to_string(),
            created_at: now,
            ttl,
        };

        // push returns the replaced value for the same key, or the LRU victim
        if let Some((evicted_key, _)) = inner.entries.push(key.to_string(), entry) {
            if evicted_key != key {
                inner.evictions += 1;
            }
        }
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.evictions += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.entries.len(),
            capacity: self.capacity.get(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
