//! Chain controller — sequential strategy fallback under one global
//! deadline.
//!
//! Strategies run one at a time, never racing: parallel attempts would
//! multiply load against the target and burn pooled browsers. Every outcome
//! feeds back into domain intelligence, and every call returns a normal
//! [`AcquisitionResult`] — total failure included.

use super::{
    AcquisitionRequest, AcquisitionResult, FetchStrategy, LayerFailure, StrategyKind,
};
use crate::error::{ErrorKind, FetchError};
use crate::intelligence::{normalize_host, DomainIntelligence};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub struct ChainController {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    intel: Arc<DomainIntelligence>,
}

impl ChainController {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>, intel: Arc<DomainIntelligence>) -> Self {
        Self { strategies, intel }
    }

    pub fn intelligence(&self) -> &Arc<DomainIntelligence> {
        &self.intel
    }

    fn strategy(&self, kind: StrategyKind) -> Option<&Arc<dyn FetchStrategy>> {
        self.strategies.iter().find(|s| s.kind() == kind)
    }

    /// Run the acquisition chain for one request.
    pub async fn acquire(&self, request: AcquisitionRequest) -> AcquisitionResult {
        let start = Instant::now();
        let mut failures: Vec<LayerFailure> = Vec::new();

        let url = match parse_request_url(&request.url) {
            Ok(url) => url,
            Err(detail) => {
                warn!(url = %request.url, "rejecting malformed request: {detail}");
                failures.push(LayerFailure {
                    strategy: None,
                    error: ErrorKind::MalformedRequest,
                    detail,
                    elapsed_ms: 0,
                });
                return AcquisitionResult::failed(start.elapsed(), failures);
            }
        };
        // Validation guarantees a host is present.
        let host = normalize_host(url.host_str().unwrap_or_default());

        let order: Vec<StrategyKind> = request
            .strategy_override
            .clone()
            .unwrap_or_else(|| self.intel.strategy_order(&host));
        let budget = request
            .deadline_override
            .unwrap_or_else(|| self.intel.chain_budget(&order));
        let deadline = start + budget;
        let attempts_per_layer = request.attempts_per_layer.unwrap_or(1).max(1);

        debug!(%url, ?order, budget_ms = budget.as_millis() as u64, "starting acquisition chain");

        'layers: for kind in order {
            let Some(strategy) = self.strategy(kind) else {
                // An override may name a strategy this controller was not
                // built with.
                continue;
            };

            for _attempt in 1..=attempts_per_layer {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    failures.push(LayerFailure {
                        strategy: None,
                        error: ErrorKind::NetworkTimeout,
                        detail: "global deadline exhausted before layer could run".into(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                    break 'layers;
                }

                let layer_timeout = self.intel.get_timeout(&host, kind).min(remaining);
                let attempt_start = Instant::now();

                match strategy.fetch(&url, layer_timeout).await {
                    Ok(content) => {
                        let latency = attempt_start.elapsed();
                        self.intel.record_outcome(&host, kind, true, latency);
                        info!(
                            %url,
                            strategy = %kind,
                            latency_ms = latency.as_millis() as u64,
                            layers_failed = failures.len(),
                            "acquisition succeeded"
                        );
                        return AcquisitionResult::succeeded(
                            content.html,
                            content.insecure,
                            kind,
                            start.elapsed(),
                            failures,
                        );
                    }
                    Err(err) => {
                        let latency = attempt_start.elapsed();
                        self.intel.record_outcome(&host, kind, false, latency);
                        warn!(%url, strategy = %kind, error = %err, "layer failed");

                        let fatal = err.is_fatal();
                        // Timeouts and pool exhaustion will not improve on an
                        // immediate retry of the same layer.
                        let retry_same_layer = !matches!(
                            err,
                            FetchError::NetworkTimeout { .. } | FetchError::PoolExhausted
                        );
                        failures.push(LayerFailure {
                            strategy: Some(kind),
                            error: err.kind(),
                            detail: err.to_string(),
                            elapsed_ms: latency.as_millis() as u64,
                        });

                        if fatal {
                            return AcquisitionResult::failed(start.elapsed(), failures);
                        }
                        if !retry_same_layer {
                            break;
                        }
                    }
                }
            }
        }

        warn!(%url, layers = failures.len(), "all acquisition layers exhausted");
        AcquisitionResult::failed(start.elapsed(), failures)
    }
}

fn parse_request_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL {raw:?}: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("unsupported scheme {scheme:?}")),
    }
    if url.host_str().is_none() {
        return Err(format!("URL {raw:?} has no host"));
    }
    Ok(url)
}
