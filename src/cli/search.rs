// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::search::{
    HealthState, ProviderConfig, ProviderKind, RateLimit, SearchConfig, SearchError,
    SearchResponse, SearchRotationController,
};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// One or more queries; several queries run concurrently
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Maximum provider calls per query (defaults to the configured budget)
    #[arg(long, env = "SEARCH_MAX_CALLS")]
    pub max_calls: Option<u32>,

    /// Number of results per query
    #[arg(long, short = 'n')]
    pub num_results: Option<usize>,

    /// TOML config file (otherwise built from environment variables)
    #[arg(long, env = "SEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print responses as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the providers command
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// TOML config file (otherwise built from environment variables)
    #[arg(long, env = "SEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run one or more searches and print the results
pub async fn run_search(args: SearchArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(max_calls) = args.max_calls {
        config.max_calls_per_query = max_calls;
    }
    if let Some(num_results) = args.num_results {
        config.default_num_results = num_results;
    }

    let controller =
        SearchRotationController::from_config(&config).context("Invalid search configuration")?;
    let budget = controller.settings().max_calls;

    let outcomes = if args.queries.len() == 1 {
        vec![controller.search_with_budget(&args.queries[0], budget).await]
    } else {
        info!("Running {} searches concurrently", args.queries.len());
        controller.batch_search(&args.queries).await
    };

    let mut failed = 0;
    for (query, outcome) in args.queries.iter().zip(outcomes) {
        match outcome {
            Ok(response) if args.json => println!("{}", serde_json::to_string_pretty(&response)?),
            Ok(response) => print_response(&response),
            Err(e) => {
                failed += 1;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&error_json(query, &e))?);
                } else {
                    eprintln!("❌ {}", e);
                }
            }
        }
    }

    let stats = controller.context().cache.stats();
    debug!(
        "Cache: {} entries, {} hits, {} misses",
        stats.entries, stats.hits, stats.misses
    );

    if failed > 0 {
        return Err(anyhow!("{} of {} searches failed", failed, args.queries.len()));
    }
    Ok(())
}

/// List configured providers in attempt order
pub async fn list_providers(args: ProvidersArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let controller =
        SearchRotationController::from_config(&config).context("Invalid search configuration")?;

    let providers = controller.providers();
    if args.json {
        let listing: Vec<_> = providers
            .iter()
            .map(|p| {
                json!({
                    "name": p.descriptor.name,
                    "priority": p.descriptor.priority,
                    "rateLimit": p.descriptor.rate_limit.map(|l| json!({
                        "maxCalls": l.max_calls,
                        "windowSecs": l.window.as_secs(),
                    })),
                    "remainingCalls": p.remaining_calls,
                    "health": p.state,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("\n📋 Search providers (in attempt order):");
    for p in &providers {
        let limit = match p.descriptor.rate_limit {
            Some(l) => format!("{} calls / {}s", l.max_calls, l.window.as_secs()),
            None => "unlimited".to_string(),
        };
        let state = match &p.state {
            HealthState::Healthy => "healthy".to_string(),
            HealthState::CoolingDown { remaining_ms } => format!("cooling down ({}ms)", remaining_ms),
            HealthState::Disabled { reason } => format!("disabled: {}", reason),
        };
        println!(
            "  {:<12} priority {:<4} {:<20} {}",
            p.descriptor.name, p.descriptor.priority, limit, state
        );
    }
    println!("\n  Max calls per query: {}", config.max_calls_per_query);
    println!("  Cache TTL:           {}s", config.cache_ttl_secs);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    let origin = if response.cached { "cache" } else { "live" };
    println!(
        "\n🔎 {} ({} results from {}, {}, {} calls, {}ms)",
        response.query,
        response.result_count,
        response.provider,
        origin,
        response.provider_calls,
        response.search_time_ms
    );
    for result in &response.results {
        println!("  {}. {}", result.rank, result.title);
        println!("     {}", result.url);
        if !result.snippet.is_empty() {
            println!("     {}", result.snippet);
        }
    }
}

fn error_json(query: &str, error: &SearchError) -> serde_json::Value {
    json!({
        "query": query,
        "error": error.to_string(),
        "failures": error.failures(),
    })
}

/// Load configuration from a TOML file, or from the environment
pub fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => config_from_env(),
    }
}

/// Build a configuration from environment variables
///
/// Brave and Tavily are added when their API keys are set; DuckDuckGo is
/// always added as the fallback unless `SEARCH_DUCKDUCKGO_ENABLED=false`.
pub fn config_from_env() -> Result<SearchConfig> {
    config_from_vars(|key| env::var(key).ok())
}

/// Build a configuration from an arbitrary variable lookup
pub fn config_from_vars<F>(var: F) -> Result<SearchConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = SearchConfig::default();

    if let Some(v) = parse_var(&var, "SEARCH_MAX_CALLS")? {
        config.max_calls_per_query = v;
    }
    if let Some(v) = parse_var(&var, "SEARCH_CACHE_TTL_SECS")? {
        config.cache_ttl_secs = v;
    }
    if let Some(v) = parse_var(&var, "SEARCH_CACHE_MAX_ENTRIES")? {
        config.cache_max_entries = v;
    }
    if let Some(v) = parse_var(&var, "SEARCH_TIMEOUT_MS")? {
        config.request_timeout_ms = v;
    }
    if let Some(v) = parse_var(&var, "SEARCH_NUM_RESULTS")? {
        config.default_num_results = v;
    }
    if let Some(v) = parse_var(&var, "SEARCH_NETWORK_RETRIES")? {
        config.network_retries = v;
    }
    let rate_limit = parse_var::<u32, _>(&var, "SEARCH_RATE_LIMIT_PER_MINUTE")?.map(RateLimit::per_minute);

    let keyed = [
        (ProviderKind::Brave, "BRAVE_API_KEY", 10),
        (ProviderKind::Tavily, "TAVILY_API_KEY", 20),
    ];
    for (kind, key_var, priority) in keyed {
        if let Some(api_key) = var(key_var).filter(|k| !k.trim().is_empty()) {
            let mut provider = ProviderConfig::new(kind)
                .with_api_key(api_key)
                .with_priority(priority);
            provider.rate_limit = rate_limit;
            config.providers.push(provider);
            debug!("{} provider enabled", kind);
        }
    }

    let ddg_enabled = var("SEARCH_DUCKDUCKGO_ENABLED")
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(true);
    if ddg_enabled {
        config
            .providers
            .push(ProviderConfig::new(ProviderKind::DuckDuckGo).with_priority(50));
    }

    Ok(config)
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
        })
        .transpose()
}
