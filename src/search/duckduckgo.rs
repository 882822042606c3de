// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! DuckDuckGo search provider
//!
//! Implements web search using DuckDuckGo's HTML interface.
//! No API key required, serves as a fallback provider.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::{classify_status, classify_transport, http_client, rank_results, SearchProvider};
use super::types::{ProviderError, SearchResult};

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const DDG_MAX_PAGE: usize = 30;

// Use a realistic browser User-Agent to avoid being blocked
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// DuckDuckGo search provider (no API key required)
pub struct DuckDuckGoProvider {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl DuckDuckGoProvider {
    /// Create a new DuckDuckGo provider
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout, Some(BROWSER_USER_AGENT))?,
            endpoint: DDG_HTML_URL.to_string(),
            timeout,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn fetch(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &body));
        }

        let html = response
            .text()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        // Bot challenge page instead of results
        if html.contains("anomaly-modal") {
            return Err(ProviderError::RateLimited {
                retry_after_secs: None,
            });
        }

        let results = parse_ddg_html(&html, max_results.min(DDG_MAX_PAGE))?;
        debug!("DuckDuckGo returned {} results", results.len());
        Ok(results)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn max_page_size(&self) -> usize {
        DDG_MAX_PAGE
    }
}

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| ProviderError::Network {
        message: format!("invalid selector '{}': {:?}", css, e),
    })
}

/// Parse the DuckDuckGo HTML results page, skipping sponsored blocks
pub(crate) fn parse_ddg_html(
    html: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, ProviderError> {
    let document = Html::parse_document(html);
    let block_selector = selector("div.result:not(.result--ad)")?;
    let link_selector = selector("a.result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut results = Vec::new();
    for block in document.select(&block_selector) {
        if results.len() >= max_results {
            break;
        }

        let Some(link) = block.select(&link_selector).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(extract_ddg_url) else {
            continue;
        };
        let title = element_text(&link);
        if title.is_empty() {
            continue;
        }
        let snippet = block
            .select(&snippet_selector)
            .next()
            .map(|s| element_text(&s))
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            url,
            snippet,
            source: "duckduckgo".to_string(),
            rank: 0,
        });
    }

    rank_results(&mut results);
    Ok(results)
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract actual URL from DuckDuckGo's redirect URL
///
/// DDG links look like `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
fn extract_ddg_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
        let target = Url::parse(&target).ok()?;
        return matches!(target.scheme(), "http" | "https").then(|| target.to_string());
    }

    let is_ddg_host = parsed
        .host_str()
        .map(|h| h.ends_with("duckduckgo.com"))
        .unwrap_or(false);
    (!is_ddg_host && matches!(parsed.scheme(), "http" | "https")).then(|| parsed.to_string())
}
