// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod acquisition;
mod cli;
mod config;
mod engine;
mod error;
mod intelligence;
mod pool;
mod renderer;
mod stealth;

use cli::fetch_cmd::FetchOptions;
use config::Config;

#[derive(Parser)]
#[command(
    name = "forager",
    about = "Forager — resilient acquisition of defended web content",
    version,
    after_help = "Configuration comes from FORAGER_* environment variables; run 'forager doctor' to inspect it."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one URL through the strategy chain and print its HTML
    Fetch {
        /// Target URL (http or https)
        url: String,
        /// Global deadline in milliseconds (default: sum of layer budgets)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Comma-separated strategy order override
        /// (browser_pool, advanced, basic_http)
        #[arg(long, value_delimiter = ',')]
        order: Option<Vec<String>>,
        /// Attempts per layer before advancing
        #[arg(long)]
        attempts: Option<u32>,
    },
    /// Fetch every URL in a file (one per line)
    FetchMany {
        /// File with one URL per line; '#' starts a comment
        file: PathBuf,
        /// Global deadline per URL in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Check environment and print the effective configuration
    Doctor,
}

fn parse_order(order: Option<Vec<String>>) -> Result<Option<Vec<acquisition::StrategyKind>>> {
    match order {
        None => Ok(None),
        Some(names) => names
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<_>>>()
            .map(Some),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "forager=debug" } else { "forager=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Fetch {
            url,
            timeout_ms,
            order,
            attempts,
        } => {
            let options = FetchOptions {
                timeout_ms,
                order: parse_order(order)?,
                attempts,
            };
            cli::fetch_cmd::run(config, &url, options, cli.json, cli.quiet).await
        }
        Commands::FetchMany { file, timeout_ms } => {
            let options = FetchOptions {
                timeout_ms,
                order: None,
                attempts: None,
            };
            cli::fetch_cmd::run_many(config, &file, options, cli.json, cli.quiet).await
        }
        Commands::Doctor => cli::doctor::run(&config),
    }
}
