// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for the search gateway

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::health::HealthState;

/// A single normalized search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Title of the result page
    pub title: String,
    /// URL of the result page
    pub url: String,
    /// Snippet/description returned by the provider
    pub snippet: String,
    /// Provider that produced the result (e.g. "brave", "tavily")
    pub source: String,
    /// 1-based position in the provider's relevance order
    pub rank: u32,
}

/// Response returned to the caller of the rotation controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// The query as issued by the caller
    pub query: String,
    /// Results in provider order
    pub results: Vec<SearchResult>,
    /// Provider that served the results (originally, when cached)
    pub provider: String,
    /// Whether the results came from the cache
    pub cached: bool,
    /// Provider calls consumed by this logical query
    pub provider_calls: u32,
    /// Wall time spent in milliseconds
    pub search_time_ms: u64,
    /// Number of results returned
    pub result_count: usize,
}

/// Failure reported by a single provider adapter call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Missing or rejected credential. Not retryable.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// The provider itself signalled throttling
    #[error("rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport failure, timeout, server error or undecodable body
    #[error("network error: {message}")]
    Network { message: String },
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {}s", secs),
        None => String::new(),
    }
}

impl ProviderError {
    /// Transient errors count towards a provider's suspension threshold
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

/// Why a provider did not produce usable results for a logical query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Local rate limiter denied admission; no call was made
    Throttled,
    /// Provider returned a throttling response
    RateLimited { retry_after_secs: Option<u64> },
    /// Transport failure or timeout
    Network { message: String },
    /// Credential rejected; provider disabled for the session
    Auth { message: String },
    /// Call succeeded with zero results
    EmptyResult,
    /// Skipped without a call: disabled or cooling down
    Unavailable { state: HealthState },
}

impl From<ProviderError> for FailureReason {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth { message } => Self::Auth { message },
            ProviderError::RateLimited { retry_after_secs } => {
                Self::RateLimited { retry_after_secs }
            }
            ProviderError::Network { message } => Self::Network { message },
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttled => write!(f, "throttled by local rate limit"),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limited by provider{}", retry_hint(retry_after_secs))
            }
            Self::Network { message } => write!(f, "network error: {}", message),
            Self::Auth { message } => write!(f, "authentication failed: {}", message),
            Self::EmptyResult => write!(f, "no results"),
            Self::Unavailable { state } => match state {
                HealthState::Disabled { reason } => write!(f, "disabled: {}", reason),
                HealthState::CoolingDown { remaining_ms } => {
                    write!(f, "cooling down for {}ms", remaining_ms)
                }
                HealthState::Healthy => write!(f, "unavailable"),
            },
        }
    }
}

/// One provider's outcome within an exhausted search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: FailureReason,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Errors surfaced to callers of the gateway
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query rejected before any provider was consulted
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Every candidate provider failed within the call budget
    #[error("Search exhausted for '{query}' ({})", summarize(.failures))]
    Exhausted {
        query: String,
        failures: Vec<ProviderFailure>,
    },
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers available".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SearchError {
    /// Per-provider failures, empty for non-exhaustion errors
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::Exhausted { failures, .. } => failures,
            Self::InvalidQuery { .. } => &[],
        }
    }
}
