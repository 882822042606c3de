// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Query validation and cache-key normalization

use super::types::SearchError;

/// Maximum accepted query length in characters
pub const MAX_QUERY_CHARS: usize = 500;

/// Fold case and whitespace so equivalent queries share a cache key
///
/// "  Rust   ASYNC\tRuntimes " and "rust async runtimes" map to the same key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a caller query and return its normalized form
///
/// Rejects queries that are empty after normalization, that exceed
/// [`MAX_QUERY_CHARS`], or that are a bare run of five or more digits.
pub fn validate_query(query: &str) -> Result<String, SearchError> {
    let normalized = normalize_query(query);

    if normalized.is_empty() {
        return Err(SearchError::InvalidQuery {
            reason: "query is empty".to_string(),
        });
    }

    if normalized.chars().count() > MAX_QUERY_CHARS {
        return Err(SearchError::InvalidQuery {
            reason: format!("query exceeds {} characters", MAX_QUERY_CHARS),
        });
    }

    if normalized.len() >= 5 && normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(SearchError::InvalidQuery {
            reason: "query is only digits".to_string(),
        });
    }

    Ok(normalized)
}
