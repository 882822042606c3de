// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search provider trait definition

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limiter::RateLimit;
use super::types::{ProviderError, SearchResult};

/// Trait for implementing search provider adapters
///
/// Adapters are stateless apart from credentials. They translate one
/// backend's response into [`SearchResult`]s in the backend's own
/// relevance order. Zero results is `Ok(vec![])`, not an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Perform a single search call
    ///
    /// # Arguments
    /// * `query` - The search query string (already validated)
    /// * `max_results` - Maximum number of results, clamped to [`max_page_size`]
    ///
    /// [`max_page_size`]: SearchProvider::max_page_size
    async fn fetch(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, ProviderError>;

    /// Provider name, used for rate limiting, health and diagnostics
    fn name(&self) -> &str;

    /// Largest page the backend will return in one call
    fn max_page_size(&self) -> usize {
        10
    }
}

/// Static description of a configured provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,
    /// Lower values are tried first
    pub priority: u8,
    /// Optional per-provider call quota
    pub rate_limit: Option<RateLimit>,
}

/// A provider adapter together with its descriptor
#[derive(Clone)]
pub struct RegisteredProvider {
    pub descriptor: ProviderDescriptor,
    pub adapter: Arc<dyn SearchProvider>,
}

impl RegisteredProvider {
    /// Register an adapter under its own name
    pub fn new(adapter: Arc<dyn SearchProvider>, priority: u8) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                name: adapter.name().to_string(),
                priority,
                rate_limit: None,
            },
            adapter,
        }
    }

    /// Attach a rate limit to this provider
    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.descriptor.rate_limit = Some(limit);
        self
    }

    /// Override the name used for limiter/health bookkeeping
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Map a non-success HTTP status to a provider error
///
/// 401/403 are credential problems, 429 is provider throttling and
/// everything else is treated as a transient network failure.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
            message: format!("{} {}", status.as_u16(), snip(body)),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after_secs(headers),
        },
        _ => ProviderError::Network {
            message: format!("HTTP {} {}", status.as_u16(), snip(body)),
        },
    }
}

/// Map a transport-level reqwest failure to a provider error
pub fn classify_transport(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Network {
            message: format!("request timed out after {}ms", timeout.as_millis()),
        }
    } else {
        ProviderError::Network {
            message: err.to_string(),
        }
    }
}

/// Build an HTTP client bounded by `timeout`
pub(crate) fn http_client(
    timeout: Duration,
    user_agent: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)));
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder.build()
}

/// Assign 1-based ranks in the order results were returned
pub(crate) fn rank_results(results: &mut [SearchResult]) {
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = (i + 1) as u32;
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn snip(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        let mut s: String = trimmed.chars().take(200).collect();
        s.push_str("...");
        s
    } else {
        trimmed.to_string()
    }
}
