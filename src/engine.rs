// Copyright 2026 Forager Contributors
// SPDX-License-Identifier: Apache-2.0

//! Public engine facade.
//!
//! Wires the components together from a [`Config`], gates concurrent
//! acquisitions behind a semaphore so the shared browser pool and the
//! target sites are never overloaded, consults the result cache before the
//! chain, and accumulates run statistics.

use crate::acquisition::advanced::AdvancedStrategy;
use crate::acquisition::browser_pool::BrowserPoolStrategy;
use crate::acquisition::chain::ChainController;
use crate::acquisition::http::BasicHttpStrategy;
use crate::acquisition::{AcquisitionRequest, AcquisitionResult, FetchStrategy, StrategyKind};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::intelligence::cache::{CacheStats, ResultCache};
use crate::intelligence::{DomainIntelligence, TimeoutTable};
use crate::pool::{BrowserPool, PoolStats};
use crate::renderer::chromium::{find_chromium, ChromiumFactory};
use crate::renderer::{NoopFactory, RendererFactory};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Default)]
struct EngineCounters {
    total: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    by_strategy: Mutex<BTreeMap<StrategyKind, u64>>,
    by_error: Mutex<BTreeMap<ErrorKind, u64>>,
}

/// Serializable statistics snapshot.
#[derive(Debug, Serialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub failures: u64,
    pub success_by_strategy: BTreeMap<String, u64>,
    pub error_distribution: BTreeMap<String, u64>,
    pub cache: CacheStats,
    pub pool: Option<PoolStats>,
}

pub struct Engine {
    config: Config,
    controller: Arc<ChainController>,
    pool: Option<BrowserPool>,
    gate: Arc<Semaphore>,
    cache: ResultCache,
    counters: EngineCounters,
}

impl Engine {
    /// Build a production engine: launches the browser pool and wires all
    /// three strategies. A missing Chromium degrades gracefully — noop
    /// renderers take the browser slots, both browser layers fail fast, and
    /// plain HTTP still works.
    pub async fn new(config: Config) -> Self {
        let intel = Arc::new(DomainIntelligence::new(TimeoutTable::from_config(&config)));

        let chromium = find_chromium(config.chromium_path.as_deref());
        let (pooled_factory, advanced_factory): (Arc<dyn RendererFactory>, Arc<dyn RendererFactory>) =
            if chromium.is_some() {
                (
                    Arc::new(ChromiumFactory::new(config.chromium_path.clone(), false)),
                    Arc::new(ChromiumFactory::new(config.chromium_path.clone(), true)),
                )
            } else {
                warn!("Chromium not found; running HTTP-only");
                (Arc::new(NoopFactory), Arc::new(NoopFactory))
            };

        let pool = BrowserPool::initialize(config.pool_size, pooled_factory, config.mode).await;

        let strategies: Vec<Arc<dyn FetchStrategy>> = vec![
            Arc::new(BrowserPoolStrategy::new(
                pool.clone(),
                config.borrow_timeout,
                config.mode,
            )),
            Arc::new(AdvancedStrategy::new(advanced_factory, config.mode)),
            Arc::new(BasicHttpStrategy::new(&config)),
        ];

        let controller = Arc::new(ChainController::new(strategies, intel));

        info!(
            mode = config.mode.as_str(),
            pool_size = config.pool_size,
            max_concurrent = config.max_concurrent,
            "engine ready"
        );

        Self {
            gate: Arc::new(Semaphore::new(config.max_concurrent)),
            cache: ResultCache::new(config.cache_capacity, config.cache_ttl),
            controller,
            pool: Some(pool),
            counters: EngineCounters::default(),
            config,
        }
    }

    /// Build an engine around a prebuilt controller — the seam for tests and
    /// embedders that bring their own strategies. No browser pool is
    /// launched.
    pub fn with_controller(config: Config, controller: Arc<ChainController>) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(config.max_concurrent)),
            cache: ResultCache::new(config.cache_capacity, config.cache_ttl),
            controller,
            pool: None,
            counters: EngineCounters::default(),
            config,
        }
    }

    /// Acquire one URL. Waits for a worker slot when the engine is at its
    /// concurrency cap; never returns an error.
    pub async fn acquire(&self, request: AcquisitionRequest) -> AcquisitionResult {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        if let Some(mut hit) = self.cache.get(&request.url) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            hit.served_from_cache = true;
            return hit;
        }

        let url = request.url.clone();
        let result = {
            let _permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Engine shut down while we were queued.
                    return AcquisitionResult::failed(std::time::Duration::ZERO, Vec::new());
                }
            };
            self.controller.acquire(request).await
        };

        self.record(&result);
        self.cache.put(&url, &result);
        result
    }

    /// Acquire a batch, bounded by the same concurrency cap. Results come
    /// back in input order.
    pub async fn acquire_many(
        &self,
        requests: Vec<AcquisitionRequest>,
    ) -> Vec<AcquisitionResult> {
        stream::iter(requests)
            .map(|request| self.acquire(request))
            .buffered(self.config.max_concurrent)
            .collect()
            .await
    }

    fn record(&self, result: &AcquisitionResult) {
        if result.success {
            if let Some(strategy) = result.strategy {
                let mut by_strategy = self
                    .counters
                    .by_strategy
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                *by_strategy.entry(strategy).or_insert(0) += 1;
            }
        } else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        let mut by_error = self
            .counters
            .by_error
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for failure in &result.failures {
            *by_error.entry(failure.error).or_insert(0) += 1;
        }
    }

    pub fn stats(&self) -> EngineStats {
        let by_strategy = self
            .counters
            .by_strategy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let by_error = self
            .counters
            .by_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();

        EngineStats {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            success_by_strategy: by_strategy,
            error_distribution: by_error,
            cache: self.cache.stats(),
            pool: self.pool.as_ref().map(|p| p.stats()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop accepting work and tear down pooled browsers.
    pub async fn shutdown(&self) {
        self.gate.close();
        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
        info!("engine shut down");
    }
}
