//! `forager fetch` and `forager fetch-many`.

use crate::acquisition::{AcquisitionRequest, AcquisitionResult, StrategyKind};
use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

pub struct FetchOptions {
    pub timeout_ms: Option<u64>,
    pub order: Option<Vec<StrategyKind>>,
    pub attempts: Option<u32>,
}

fn build_request(url: &str, options: &FetchOptions) -> AcquisitionRequest {
    let mut request = AcquisitionRequest::new(url);
    if let Some(ms) = options.timeout_ms {
        request = request.with_deadline(Duration::from_millis(ms));
    }
    if let Some(order) = &options.order {
        request = request.with_order(order.clone());
    }
    if let Some(attempts) = options.attempts {
        request = request.with_attempts_per_layer(attempts);
    }
    request
}

fn print_result(result: &AcquisitionResult, url: &str, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if result.success {
        if !quiet {
            let strategy = result
                .strategy
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".into());
            eprintln!(
                "  fetched {url} via {strategy} in {}ms ({} bytes{}{})",
                result.elapsed_ms,
                result.content.len(),
                if result.insecure { ", insecure" } else { "" },
                if result.served_from_cache { ", cached" } else { "" },
            );
        }
        println!("{}", result.content);
    } else {
        eprintln!("  failed to fetch {url} after {}ms:", result.elapsed_ms);
        for failure in &result.failures {
            let layer = failure
                .strategy
                .map(|s| s.to_string())
                .unwrap_or_else(|| "chain".into());
            eprintln!("    {layer}: {} ({})", failure.detail, failure.error);
        }
    }
    Ok(())
}

/// Fetch one URL and print the content (or the failure trail).
pub async fn run(
    config: Config,
    url: &str,
    options: FetchOptions,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let engine = Engine::new(config).await;
    let result = engine.acquire(build_request(url, &options)).await;
    let success = result.success;
    print_result(&result, url, json, quiet)?;
    engine.shutdown().await;

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Fetch every URL listed in a file (one per line, `#` comments allowed).
pub async fn run_many(
    config: Config,
    file: &Path,
    options: FetchOptions,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read URL list {}", file.display()))?;
    let urls: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let engine = Engine::new(config).await;
    let requests = urls.iter().map(|u| build_request(u, &options)).collect();
    let results = engine.acquire_many(requests).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let ok = results.iter().filter(|r| r.success).count();
        for (url, result) in urls.iter().zip(&results) {
            let status = if result.success {
                format!(
                    "ok ({} bytes, {})",
                    result.content.len(),
                    result
                        .strategy
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".into())
                )
            } else {
                "FAILED".to_string()
            };
            println!("{url}: {status}");
        }
        if !quiet {
            eprintln!();
            eprintln!("  {ok}/{} succeeded", results.len());
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&engine.stats()).unwrap_or_default()
            );
        }
    }

    engine.shutdown().await;
    Ok(())
}
