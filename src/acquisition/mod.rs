//! Layered content acquisition.
//!
//! Three interchangeable fetch strategies sit behind [`FetchStrategy`]; the
//! [`chain::ChainController`] tries them in an order derived from per-domain
//! history, under one global deadline, and always returns a normalized
//! [`AcquisitionResult`].

pub mod advanced;
pub mod browser_pool;
pub mod chain;
pub mod http;

use crate::error::{ErrorKind, FetchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Bodies shorter than this are challenge stubs or empty shells, not real
/// content, and count as layer failures.
pub const MIN_CONTENT_LEN: usize = 512;

/// The closed set of fetch strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BrowserPool,
    Advanced,
    BasicHttp,
}

impl StrategyKind {
    /// Order used for domains with no recorded history.
    pub const DEFAULT_ORDER: [StrategyKind; 3] = [
        StrategyKind::BrowserPool,
        StrategyKind::Advanced,
        StrategyKind::BasicHttp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::BrowserPool => "browser_pool",
            StrategyKind::Advanced => "advanced",
            StrategyKind::BasicHttp => "basic_http",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser_pool" | "browser-pool" | "pool" => Ok(StrategyKind::BrowserPool),
            "advanced" => Ok(StrategyKind::Advanced),
            "basic_http" | "basic-http" | "http" => Ok(StrategyKind::BasicHttp),
            other => anyhow::bail!("unknown strategy {other:?}"),
        }
    }
}

/// One acquisition request. Immutable once issued.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub url: String,
    /// Overrides the global deadline (default: sum of per-layer budgets).
    pub deadline_override: Option<Duration>,
    /// Overrides the computed strategy order.
    pub strategy_override: Option<Vec<StrategyKind>>,
    /// Attempts per layer before advancing (default 1).
    pub attempts_per_layer: Option<u32>,
}

impl AcquisitionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            deadline_override: None,
            strategy_override: None,
            attempts_per_layer: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_override = Some(deadline);
        self
    }

    pub fn with_order(mut self, order: Vec<StrategyKind>) -> Self {
        self.strategy_override = Some(order);
        self
    }

    pub fn with_attempts_per_layer(mut self, attempts: u32) -> Self {
        self.attempts_per_layer = Some(attempts);
        self
    }
}

/// What a strategy hands back on success.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub html: String,
    /// Set when the content was fetched with certificate verification
    /// disabled (dual-TLS fallback).
    pub insecure: bool,
}

/// One failed layer in the diagnostic trail. `strategy` is `None` for
/// chain-level entries (malformed request, exhausted global deadline) that
/// never reached a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerFailure {
    pub strategy: Option<StrategyKind>,
    pub error: ErrorKind,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// Normalized outcome of one acquisition. Total failure is a value, not an
/// error; callers inspect `success` and the trail.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionResult {
    pub success: bool,
    pub content: String,
    /// Content was fetched with certificate verification disabled.
    pub insecure: bool,
    /// Strategy that produced the content, when successful.
    pub strategy: Option<StrategyKind>,
    pub elapsed_ms: u64,
    /// Ordered per-layer failures. Empty on first-layer success.
    pub failures: Vec<LayerFailure>,
    pub fetched_at: DateTime<Utc>,
    /// Served from the result cache instead of the network.
    pub served_from_cache: bool,
}

impl AcquisitionResult {
    pub fn succeeded(
        content: String,
        insecure: bool,
        strategy: StrategyKind,
        elapsed: Duration,
        failures: Vec<LayerFailure>,
    ) -> Self {
        Self {
            success: true,
            content,
            insecure,
            strategy: Some(strategy),
            elapsed_ms: elapsed.as_millis() as u64,
            failures,
            fetched_at: Utc::now(),
            served_from_cache: false,
        }
    }

    pub fn failed(elapsed: Duration, failures: Vec<LayerFailure>) -> Self {
        Self {
            success: false,
            content: String::new(),
            insecure: false,
            strategy: None,
            elapsed_ms: elapsed.as_millis() as u64,
            failures,
            fetched_at: Utc::now(),
            served_from_cache: false,
        }
    }
}

/// One interchangeable method of fetching page content.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Fetch the page, bounded by `timeout`. The controller guarantees
    /// `timeout` never exceeds the remaining global deadline.
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedContent, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_roundtrip() {
        for kind in StrategyKind::DEFAULT_ORDER {
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
        }
        assert!("teleport".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StrategyKind::BrowserPool).unwrap(),
            "\"browser_pool\""
        );
    }

    #[test]
    fn test_request_builder() {
        let req = AcquisitionRequest::new("https://example.com")
            .with_deadline(Duration::from_secs(10))
            .with_order(vec![StrategyKind::BasicHttp]);
        assert_eq!(req.deadline_override, Some(Duration::from_secs(10)));
        assert_eq!(req.strategy_override.as_deref(), Some(&[StrategyKind::BasicHttp][..]));
    }
}
