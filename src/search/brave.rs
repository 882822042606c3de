// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Brave Search API provider
//!
//! Implements web search using the Brave Search API (web vertical).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{classify_status, classify_transport, http_client, rank_results, SearchProvider};
use super::types::{ProviderError, SearchResult};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const BRAVE_MAX_PAGE: usize = 20;

/// Brave Search API provider
pub struct BraveSearchProvider {
    api_key: Option<String>,
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl BraveSearchProvider {
    /// Create a new Brave Search provider
    ///
    /// A missing key is reported as an auth failure on the first search.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: http_client(timeout, None)?,
            endpoint: BRAVE_API_URL.to_string(),
            timeout,
        })
    }

    /// Point the provider at a different endpoint (proxies, test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ProviderError::Auth {
            message: "no Brave API key configured".to_string(),
        })?;

        let count = max_results.clamp(1, BRAVE_MAX_PAGE).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;
        let results = parse_brave_response(&body, max_results)?;
        debug!("Brave returned {} results", results.len());
        Ok(results)
    }

    fn name(&self) -> &str {
        "brave"
    }

    fn max_page_size(&self) -> usize {
        BRAVE_MAX_PAGE
    }
}

/// Parse a Brave web search body into ranked results
pub(crate) fn parse_brave_response(
    body: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, ProviderError> {
    let data: BraveResponse = serde_json::from_str(body).map_err(|e| ProviderError::Network {
        message: format!("invalid Brave response: {}", e),
    })?;

    let mut results: Vec<SearchResult> = data
        .web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .take(max_results)
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            snippet: r.description.unwrap_or_default(),
            source: "brave".to_string(),
            rank: 0,
        })
        .collect();
    rank_results(&mut results);
    Ok(results)
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    description: Option<String>,
}
