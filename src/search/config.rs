// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the search gateway
//!
//! The gateway never reads the environment itself. The application layer
//! builds a [`SearchConfig`] (see `cli::config_from_env`) or parses one from
//! TOML and hands it over.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::rate_limiter::RateLimit;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client for {provider}: {source}")]
    HttpClient {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Brave,
    Tavily,
    #[serde(alias = "ddg")]
    DuckDuckGo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brave => "brave",
            Self::Tavily => "tavily",
            Self::DuckDuckGo => "duckduckgo",
        }
    }

    /// Whether the backend refuses requests without a credential
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::DuckDuckGo)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Defaults to the kind's name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Lower values are tried first; ties keep configuration order
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Tavily search depth ("basic" or "advanced")
    #[serde(default)]
    pub search_depth: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: None,
            api_key: None,
            priority: default_priority(),
            enabled: true,
            rate_limit: None,
            search_depth: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Name used for rate limiting, health and diagnostics
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.as_str())
    }
}

/// Configuration for the search gateway
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hard cap on provider calls per logical query
    pub max_calls_per_query: u32,
    /// Cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Maximum cached queries
    pub cache_max_entries: usize,
    /// Per provider call timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Default number of results per search
    pub default_num_results: usize,
    /// Extra same-provider attempts after a network error
    pub network_retries: u32,
    /// Consecutive transient failures before a provider cools down (0 = never)
    pub failure_threshold: u32,
    /// Cooldown length in seconds
    pub cooldown_secs: u64,
    pub providers: Vec<ProviderConfig>,
}

fn default_priority() -> u8 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_calls_per_query: 5,
            cache_ttl_secs: 300,
            cache_max_entries: 1000,
            request_timeout_ms: 10_000,
            default_num_results: 5,
            network_retries: 0,
            failure_threshold: 3,
            cooldown_secs: 60,
            providers: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Parse a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SearchConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_calls_per_query == 0 {
            return Err(invalid("max_calls_per_query must be greater than 0"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs must be greater than 0"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries must be greater than 0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be greater than 0"));
        }
        if self.default_num_results == 0 {
            return Err(invalid("default_num_results must be greater than 0"));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            let name = provider.display_name();
            if !names.insert(name.to_string()) {
                return Err(invalid(&format!("duplicate provider name '{}'", name)));
            }
            if let Some(limit) = provider.rate_limit {
                if limit.max_calls == 0 {
                    return Err(invalid(&format!(
                        "rate_limit.max_calls for '{}' must be greater than 0",
                        name
                    )));
                }
                if limit.window.is_zero() {
                    return Err(invalid(&format!(
                        "rate_limit.window_secs for '{}' must be greater than 0",
                        name
                    )));
                }
            }
        }

        if self.enabled_providers().next().is_none() {
            return Err(invalid("at least one enabled provider is required"));
        }

        Ok(())
    }

    /// Providers with `enabled = true`, in configuration order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}
