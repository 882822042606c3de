// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Rate-limited multi-provider web search
//!
//! Key features:
//! - Multiple search providers (Brave, Tavily, DuckDuckGo) behind one trait
//! - Per-provider sliding-window rate limiting
//! - Global TTL + LRU result caching keyed by normalized query
//! - Provider health tracking and graceful rotation on failures

pub mod brave;
pub mod cache;
pub mod config;
pub mod context;
pub mod duckduckgo;
pub mod health;
pub mod provider;
pub mod query;
pub mod rate_limiter;
pub mod rotation;
pub mod tavily;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, CachedResults, SearchCache};
pub use config::{ConfigError, ProviderConfig, ProviderKind, SearchConfig};
pub use context::SearchContext;
pub use health::{HealthState, ProviderHealth};
pub use provider::{ProviderDescriptor, RegisteredProvider, SearchProvider};
pub use query::{normalize_query, validate_query};
pub use rate_limiter::{RateLimit, SlidingWindowLimiter};
pub use rotation::{build_provider, ProviderStatus, RotationSettings, SearchRotationController};
pub use types::{
    FailureReason, ProviderError, ProviderFailure, SearchError, SearchResponse, SearchResult,
};
