// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search rotation controller
//!
//! Coordinates search providers, the shared cache, rate limiter and health
//! registry. A logical query is served from cache when possible; otherwise
//! providers are tried in priority order, rotating on throttling, failures
//! and empty pages, until one returns results or the call budget runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::brave::BraveSearchProvider;
use super::config::{ConfigError, ProviderConfig, ProviderKind, SearchConfig};
use super::context::SearchContext;
use super::duckduckgo::DuckDuckGoProvider;
use super::health::HealthState;
use super::provider::{ProviderDescriptor, RegisteredProvider, SearchProvider};
use super::query::validate_query;
use super::tavily::TavilySearchProvider;
use super::types::{
    FailureReason, ProviderError, ProviderFailure, SearchError, SearchResponse, SearchResult,
};

/// Per-query behaviour of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSettings {
    /// Default cap on provider calls per logical query
    pub max_calls: u32,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub num_results: usize,
    /// Extra same-provider attempts after a network error
    pub network_retries: u32,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for RotationSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_calls: config.max_calls_per_query,
            cache_ttl: config.cache_ttl(),
            request_timeout: config.request_timeout(),
            num_results: config.default_num_results,
            network_retries: config.network_retries,
        }
    }
}

/// Provider descriptor with its current availability
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub descriptor: ProviderDescriptor,
    pub state: HealthState,
    /// Calls left in the current rate-limit window, `None` if unlimited
    pub remaining_calls: Option<u32>,
}

/// Outcome of one admission + call against a single provider
#[derive(Debug)]
enum Attempt {
    /// Non-empty page of results
    Served(Vec<SearchResult>),
    /// Local limiter denied admission; no call was made
    Throttled,
    /// Call succeeded with zero results
    Empty,
    Failed(ProviderError),
}

/// Rotates a logical query across providers
pub struct SearchRotationController {
    providers: Vec<RegisteredProvider>,
    context: SearchContext,
    settings: RotationSettings,
}

impl SearchRotationController {
    /// Create a controller over already constructed providers
    ///
    /// Providers are ordered by priority (lower = preferred), keeping the
    /// given order for ties. Their rate limits are registered on the shared
    /// limiter.
    pub fn new(
        mut providers: Vec<RegisteredProvider>,
        context: SearchContext,
        settings: RotationSettings,
    ) -> Self {
        providers.sort_by_key(|p| p.descriptor.priority);

        for provider in &providers {
            if let Some(limit) = provider.descriptor.rate_limit {
                context.limiter.configure(&provider.descriptor.name, limit);
            }
        }

        Self {
            providers,
            context,
            settings,
        }
    }

    /// Build the enabled providers in `config` over a fresh shared context
    pub fn from_config(config: &SearchConfig) -> Result<Self, ConfigError> {
        Self::with_context(config, SearchContext::from_config(config))
    }

    /// Build the enabled providers in `config` over an existing context
    pub fn with_context(config: &SearchConfig, context: SearchContext) -> Result<Self, ConfigError> {
        config.validate()?;

        let providers = config
            .enabled_providers()
            .map(|provider| build_provider(provider, config.request_timeout()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(providers, context, RotationSettings::from(config)))
    }

    /// Search with the configured call budget
    pub async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        self.search_with_budget(query, self.settings.max_calls).await
    }

    /// Search, making at most `max_calls` provider calls
    pub async fn search_with_budget(
        &self,
        query: &str,
        max_calls: u32,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let key = validate_query(query)?;

        if let Some(hit) = self.context.cache.get(&key) {
            debug!("Cache hit for query: {} (served by {})", key, hit.provider);
            return Ok(SearchResponse {
                query: query.to_string(),
                result_count: hit.results.len(),
                results: hit.results,
                provider: hit.provider,
                cached: true,
                provider_calls: 0,
                search_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        // Providers see the caller's wording, only whitespace is collapsed
        let provider_query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut calls = 0u32;
        let mut failures = Vec::new();

        for provider in &self.providers {
            if calls >= max_calls {
                break;
            }
            let name = provider.descriptor.name.as_str();

            let state = self.context.health.state(name);
            if state != HealthState::Healthy {
                debug!("Skipping {}: {:?}", name, state);
                failures.push(failure(name, FailureReason::Unavailable { state }));
                continue;
            }

            let mut retries_left = self.settings.network_retries;

            loop {
                match self.attempt(provider, &provider_query, &mut calls).await {
                    Attempt::Served(results) => {
                        self.context.health.record_success(name);
                        self.context
                            .cache
                            .put(&key, &results, name, self.settings.cache_ttl);

                        let elapsed_ms = start.elapsed().as_millis() as u64;
                        info!(
                            "Search complete: {} results from {} in {}ms ({} calls)",
                            results.len(),
                            name,
                            elapsed_ms,
                            calls
                        );
                        return Ok(SearchResponse {
                            query: query.to_string(),
                            result_count: results.len(),
                            results,
                            provider: name.to_string(),
                            cached: false,
                            provider_calls: calls,
                            search_time_ms: elapsed_ms,
                        });
                    }
                    Attempt::Throttled => {
                        debug!("Skipping {}: local rate limit reached", name);
                        failures.push(failure(name, FailureReason::Throttled));
                        break;
                    }
                    Attempt::Empty => {
                        self.context.health.record_success(name);
                        debug!("{} returned no results, trying next", name);
                        failures.push(failure(name, FailureReason::EmptyResult));
                        break;
                    }
                    Attempt::Failed(ProviderError::Auth { message }) => {
                        self.context.health.mark_auth_failure(name, &message);
                        failures.push(failure(name, FailureReason::Auth { message }));
                        break;
                    }
                    Attempt::Failed(err) => {
                        warn!("Search provider {} failed: {}, trying next", name, err);
                        if err.is_transient() {
                            self.context.health.record_transient_failure(name);
                        }

                        let retry = matches!(err, ProviderError::Network { .. })
                            && retries_left > 0
                            && calls < max_calls
                            && self.context.health.is_available(name);
                        failures.push(failure(name, err.into()));

                        if !retry {
                            break;
                        }
                        retries_left -= 1;
                        debug!("Retrying {} ({} retries left)", name, retries_left);
                    }
                }
            }
        }

        warn!(
            "Search exhausted for '{}' after {} calls ({} failures)",
            key,
            calls,
            failures.len()
        );
        Err(SearchError::Exhausted {
            query: query.to_string(),
            failures,
        })
    }

    /// Run several logical queries concurrently against the shared context
    pub async fn batch_search(
        &self,
        queries: &[String],
    ) -> Vec<Result<SearchResponse, SearchError>> {
        let futures: Vec<_> = queries.iter().map(|q| self.search(q)).collect();
        futures::future::join_all(futures).await
    }

    /// Providers in attempt order with their current availability
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| ProviderStatus {
                descriptor: p.descriptor.clone(),
                state: self.context.health.state(&p.descriptor.name),
                remaining_calls: self.context.limiter.remaining(&p.descriptor.name),
            })
            .collect()
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    /// Admit, record and perform one call
    ///
    /// The limiter slot is recorded before the call is awaited, so a
    /// cancelled or timed out call still counts against the window.
    async fn attempt(&self, provider: &RegisteredProvider, query: &str, calls: &mut u32) -> Attempt {
        let name = &provider.descriptor.name;
        if !self.context.limiter.try_acquire(name) {
            return Attempt::Throttled;
        }
        *calls += 1;

        let max_results = self
            .settings
            .num_results
            .clamp(1, provider.adapter.max_page_size().max(1));
        debug!("Trying search provider: {} (call {})", name, calls);

        let outcome = tokio::time::timeout(
            self.settings.request_timeout,
            provider.adapter.fetch(query, max_results),
        )
        .await;

        match outcome {
            Ok(Ok(results)) if results.is_empty() => Attempt::Empty,
            Ok(Ok(mut results)) => {
                results.truncate(max_results);
                // Report the configured name, which may differ from the adapter's
                for result in &mut results {
                    result.source.clone_from(name);
                }
                Attempt::Served(results)
            }
            Ok(Err(err)) => Attempt::Failed(err),
            Err(_) => Attempt::Failed(ProviderError::Network {
                message: format!(
                    "request timed out after {}ms",
                    self.settings.request_timeout.as_millis()
                ),
            }),
        }
    }
}

fn failure(provider: &str, reason: FailureReason) -> ProviderFailure {
    ProviderFailure {
        provider: provider.to_string(),
        reason,
    }
}

/// Construct the adapter for one configured provider
pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<RegisteredProvider, ConfigError> {
    let client_error = |source: reqwest::Error| ConfigError::HttpClient {
        provider: config.display_name().to_string(),
        source,
    };

    let adapter: Arc<dyn SearchProvider> = match config.kind {
        ProviderKind::Brave => Arc::new(
            BraveSearchProvider::new(config.api_key.clone(), timeout).map_err(client_error)?,
        ),
        ProviderKind::Tavily => {
            let mut provider =
                TavilySearchProvider::new(config.api_key.clone(), timeout).map_err(client_error)?;
            if let Some(depth) = &config.search_depth {
                provider = provider.with_search_depth(depth.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::DuckDuckGo => {
            Arc::new(DuckDuckGoProvider::new(timeout).map_err(client_error)?)
        }
    };

    if config.kind.requires_api_key() && config.api_key.is_none() {
        warn!(
            "No API key configured for {}; it will be disabled on first use",
            config.display_name()
        );
    }

    let mut registered =
        RegisteredProvider::new(adapter, config.priority).with_name(config.display_name());
    if let Some(limit) = config.rate_limit {
        registered = registered.with_rate_limit(limit);
    }
    Ok(registered)
}
