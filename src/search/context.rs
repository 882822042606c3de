// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared state for concurrent searches

use std::sync::Arc;
use std::time::Duration;

use super::cache::SearchCache;
use super::config::SearchConfig;
use super::health::ProviderHealth;
use super::rate_limiter::SlidingWindowLimiter;

/// Limiter, cache and health registry shared by every logical query
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct SearchContext {
    pub limiter: Arc<SlidingWindowLimiter>,
    pub cache: Arc<SearchCache>,
    pub health: Arc<ProviderHealth>,
}

impl SearchContext {
    pub fn new(cache_max_entries: usize, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            limiter: Arc::new(SlidingWindowLimiter::new()),
            cache: Arc::new(SearchCache::new(cache_max_entries)),
            health: Arc::new(ProviderHealth::new(failure_threshold, cooldown)),
        }
    }

    /// Build a context and register the quotas of every enabled provider
    pub fn from_config(config: &SearchConfig) -> Self {
        let context = Self::new(
            config.cache_max_entries,
            config.failure_threshold,
            config.cooldown(),
        );
        for provider in config.enabled_providers() {
            if let Some(limit) = provider.rate_limit {
                context.limiter.configure(provider.display_name(), limit);
            }
        }
        context
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        let config = SearchConfig::default();
        Self::new(
            config.cache_max_entries,
            config.failure_threshold,
            config.cooldown(),
        )
    }
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("cache", &self.cache.stats())
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}
