// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tavily Search API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::{classify_status, classify_transport, http_client, rank_results, SearchProvider};
use super::types::{ProviderError, SearchResult};

const TAVILY_API_URL: &str = "https://api.tavily.com/search";
const TAVILY_MAX_PAGE: usize = 10;

/// Tavily Search API provider
pub struct TavilySearchProvider {
    api_key: Option<String>,
    search_depth: String,
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl TavilySearchProvider {
    /// Create a new Tavily provider with "basic" search depth
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            search_depth: "basic".to_string(),
            client: http_client(timeout, None)?,
            endpoint: TAVILY_API_URL.to_string(),
            timeout,
        })
    }

    /// "basic" or "advanced"
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ProviderError::Auth {
            message: "no Tavily API key configured".to_string(),
        })?;

        let request = TavilyRequest {
            api_key,
            query,
            search_depth: &self.search_depth,
            max_results: max_results.clamp(1, TAVILY_MAX_PAGE),
            include_answer: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
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
        let results = parse_tavily_response(&body, max_results)?;
        debug!("Tavily returned {} results", results.len());
        Ok(results)
    }

    fn name(&self) -> &str {
        "tavily"
    }

    fn max_page_size(&self) -> usize {
        TAVILY_MAX_PAGE
    }
}

/// Parse a Tavily search body into ranked results
///
/// A body without a `results` array is an API-level error report.
pub(crate) fn parse_tavily_response(
    body: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, ProviderError> {
    let data: TavilyResponse = serde_json::from_str(body).map_err(|e| ProviderError::Network {
        message: format!("invalid Tavily response: {}", e),
    })?;

    let Some(raw) = data.results else {
        return Err(ProviderError::Network {
            message: format!(
                "Tavily error: {}",
                data.error.unwrap_or_else(|| "missing results".to_string())
            ),
        });
    };

    let mut results: Vec<SearchResult> = raw
        .into_iter()
        .filter(|r| !r.url.is_empty())
        .take(max_results)
        .map(|r| SearchResult {
            title: r.title.unwrap_or_else(|| "No Title".to_string()),
            url: r.url,
            snippet: r.content.unwrap_or_default().trim().to_string(),
            source: "tavily".to_string(),
            rank: 0,
        })
        .collect();
    rank_results(&mut results);
    Ok(results)
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Option<Vec<TavilyResult>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    #[serde(default)]
    url: String,
    content: Option<String>,
}
