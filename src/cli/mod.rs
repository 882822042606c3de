// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod search;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Fabstir search gateway CLI
#[derive(Parser, Debug)]
#[command(name = "fabstir-search")]
#[command(version)]
#[command(about = "Rate-limited web search across multiple providers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the web, rotating across providers
    Search(search::SearchArgs),

    /// List configured providers and their status
    Providers(search::ProvidersArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    match cli.command {
        Commands::Search(args) => search::run_search(args).await,
        Commands::Providers(args) => search::list_providers(args).await,
    }
}
