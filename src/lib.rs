// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod search;

// Re-export main types
pub use search::{
    SearchConfig, SearchContext, SearchError, SearchResponse, SearchResult,
    SearchRotationController,
};
