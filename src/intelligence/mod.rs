//! Domain intelligence — per-host acquisition statistics driving adaptive
//! timeouts and strategy ordering.
//!
//! The store lives for the process lifetime only. A cold process has no
//! profiles and falls back to the static per-layer defaults; every completed
//! attempt feeds back through [`DomainIntelligence::record_outcome`].
//!
//! Contention is limited to the same host: profiles live in a `DashMap`, so
//! concurrent updates for different domains never serialize on one lock.

pub mod cache;

use crate::acquisition::StrategyKind;
use crate::config::Config;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Exponential-moving-average weight for new latency samples.
const EMA_ALPHA: f64 = 0.3;

/// Adaptive timeout = EMA latency × this multiplier, clamped to the envelope.
const SAFETY_MULTIPLIER: f64 = 2.5;

/// Neutral success prior for a strategy with no observations, so unseen
/// strategies keep their default-order rank under a stable sort.
const UNSEEN_PRIOR: f64 = 0.5;

/// Static defaults and the adaptive envelope, lifted from [`Config`].
#[derive(Debug, Clone)]
pub struct TimeoutTable {
    pub browser_pool: Duration,
    pub advanced: Duration,
    pub basic_http: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
}

impl TimeoutTable {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser_pool: config.browser_timeout,
            advanced: config.advanced_timeout,
            basic_http: config.http_timeout,
            floor: config.timeout_floor,
            ceiling: config.timeout_ceiling,
        }
    }

    pub fn default_for(&self, strategy: StrategyKind) -> Duration {
        match strategy {
            StrategyKind::BrowserPool => self.browser_pool,
            StrategyKind::Advanced => self.advanced,
            StrategyKind::BasicHttp => self.basic_http,
        }
    }

    fn clamp(&self, value: Duration) -> Duration {
        value.clamp(self.floor, self.ceiling)
    }
}

/// Rolling statistics for one `(host, strategy)` pair.
#[derive(Debug, Clone, Copy, Default)]
struct StrategyStats {
    ema_latency_ms: f64,
    successes: u64,
    failures: u64,
}

impl StrategyStats {
    fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    fn success_rate(&self) -> f64 {
        if self.attempts() == 0 {
            UNSEEN_PRIOR
        } else {
            self.successes as f64 / self.attempts() as f64
        }
    }

    fn observe(&mut self, success: bool, latency: Duration) {
        let ms = latency.as_millis() as f64;
        self.ema_latency_ms = if self.attempts() == 0 {
            ms
        } else {
            EMA_ALPHA * ms + (1.0 - EMA_ALPHA) * self.ema_latency_ms
        };
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }
}

/// Per-host profile. Updates are moving-average merges, never wholesale
/// overwrites.
#[derive(Debug)]
struct DomainProfile {
    browser_pool: StrategyStats,
    advanced: StrategyStats,
    basic_http: StrategyStats,
    last_updated: Instant,
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self {
            browser_pool: StrategyStats::default(),
            advanced: StrategyStats::default(),
            basic_http: StrategyStats::default(),
            last_updated: Instant::now(),
        }
    }
}

impl DomainProfile {
    fn stats(&self, strategy: StrategyKind) -> &StrategyStats {
        match strategy {
            StrategyKind::BrowserPool => &self.browser_pool,
            StrategyKind::Advanced => &self.advanced,
            StrategyKind::BasicHttp => &self.basic_http,
        }
    }

    fn stats_mut(&mut self, strategy: StrategyKind) -> &mut StrategyStats {
        match strategy {
            StrategyKind::BrowserPool => &mut self.browser_pool,
            StrategyKind::Advanced => &mut self.advanced,
            StrategyKind::BasicHttp => &mut self.basic_http,
        }
    }
}

/// Process-wide table of per-domain acquisition statistics.
pub struct DomainIntelligence {
    profiles: DashMap<String, DomainProfile>,
    table: TimeoutTable,
}

impl DomainIntelligence {
    pub fn new(table: TimeoutTable) -> Self {
        Self {
            profiles: DashMap::new(),
            table,
        }
    }

    /// Adaptive timeout for one `(host, strategy)` pair.
    ///
    /// Unseen pairs get the static default; seen pairs get EMA latency times
    /// the safety multiplier. Either way the value stays inside the
    /// configured envelope, so one slow outlier cannot starve future
    /// requests and a fast streak cannot shrink the budget below the floor.
    pub fn get_timeout(&self, host: &str, strategy: StrategyKind) -> Duration {
        let adaptive = self.profiles.get(host).and_then(|profile| {
            let stats = profile.stats(strategy);
            if stats.attempts() == 0 {
                None
            } else {
                Some(Duration::from_millis(
                    (stats.ema_latency_ms * SAFETY_MULTIPLIER) as u64,
                ))
            }
        });

        self.table
            .clamp(adaptive.unwrap_or_else(|| self.table.default_for(strategy)))
    }

    /// Record one completed attempt.
    pub fn record_outcome(
        &self,
        host: &str,
        strategy: StrategyKind,
        success: bool,
        latency: Duration,
    ) {
        let mut profile = self.profiles.entry(host.to_string()).or_default();
        profile.stats_mut(strategy).observe(success, latency);
        profile.last_updated = Instant::now();
    }

    /// Strategy order for one host: best historical success rate first, ties
    /// broken by lower EMA latency. Unseen strategies take a neutral prior
    /// and the static default latency; the sort is stable over the default
    /// order, so a fresh host reproduces it exactly.
    pub fn strategy_order(&self, host: &str) -> Vec<StrategyKind> {
        let mut order = StrategyKind::DEFAULT_ORDER.to_vec();
        let Some(profile) = self.profiles.get(host) else {
            return order;
        };

        let score = |kind: StrategyKind| -> (f64, f64) {
            let stats = profile.stats(kind);
            let latency = if stats.attempts() == 0 {
                self.table.default_for(kind).as_millis() as f64
            } else {
                stats.ema_latency_ms
            };
            (stats.success_rate(), latency)
        };

        order.sort_by(|a, b| {
            let (rate_a, lat_a) = score(*a);
            let (rate_b, lat_b) = score(*b);
            rate_b
                .partial_cmp(&rate_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(lat_a.partial_cmp(&lat_b).unwrap_or(std::cmp::Ordering::Equal))
        });
        order
    }

    /// Default global deadline for a chain: the sum of the static per-layer
    /// budgets of the strategies it will try.
    pub fn chain_budget(&self, order: &[StrategyKind]) -> Duration {
        order
            .iter()
            .map(|kind| self.table.default_for(*kind))
            .sum()
    }

    /// Number of hosts with recorded history.
    pub fn tracked_hosts(&self) -> usize {
        self.profiles.len()
    }
}

/// Normalize a URL host for profile keying: lowercase, `www.` stripped.
pub fn normalize_host(host: &str) -> String {
    let lower = host.to_ascii_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TimeoutTable {
        TimeoutTable {
            browser_pool: Duration::from_millis(15_000),
            advanced: Duration::from_millis(20_000),
            basic_http: Duration::from_millis(5_000),
            floor: Duration::from_millis(2_000),
            ceiling: Duration::from_millis(30_000),
        }
    }

    #[test]
    fn test_unseen_pair_returns_default() {
        let intel = DomainIntelligence::new(table());
        assert_eq!(
            intel.get_timeout("example.com", StrategyKind::BasicHttp),
            Duration::from_millis(5_000)
        );
        assert_eq!(
            intel.get_timeout("example.com", StrategyKind::Advanced),
            Duration::from_millis(20_000)
        );
    }

    #[test]
    fn test_timeout_never_leaves_envelope() {
        let intel = DomainIntelligence::new(table());

        // Absurdly slow history must clamp to the ceiling.
        for _ in 0..10 {
            intel.record_outcome(
                "slow.com",
                StrategyKind::BrowserPool,
                true,
                Duration::from_secs(300),
            );
        }
        assert_eq!(
            intel.get_timeout("slow.com", StrategyKind::BrowserPool),
            Duration::from_millis(30_000)
        );

        // A fast streak must not shrink below the floor.
        for _ in 0..10 {
            intel.record_outcome(
                "fast.com",
                StrategyKind::BasicHttp,
                true,
                Duration::from_millis(50),
            );
        }
        assert_eq!(
            intel.get_timeout("fast.com", StrategyKind::BasicHttp),
            Duration::from_millis(2_000)
        );
    }

    #[test]
    fn test_ema_tracks_latency() {
        let intel = DomainIntelligence::new(table());
        intel.record_outcome(
            "ema.com",
            StrategyKind::BasicHttp,
            true,
            Duration::from_millis(4_000),
        );
        // First sample seeds the EMA: 4000 * 2.5 = 10000ms
        assert_eq!(
            intel.get_timeout("ema.com", StrategyKind::BasicHttp),
            Duration::from_millis(10_000)
        );

        intel.record_outcome(
            "ema.com",
            StrategyKind::BasicHttp,
            true,
            Duration::from_millis(1_000),
        );
        // EMA = 0.3*1000 + 0.7*4000 = 3100ms → timeout 7750ms
        assert_eq!(
            intel.get_timeout("ema.com", StrategyKind::BasicHttp),
            Duration::from_millis(7_750)
        );
    }

    #[test]
    fn test_fresh_host_uses_default_order() {
        let intel = DomainIntelligence::new(table());
        assert_eq!(
            intel.strategy_order("unseen.com"),
            vec![
                StrategyKind::BrowserPool,
                StrategyKind::Advanced,
                StrategyKind::BasicHttp
            ]
        );
    }

    #[test]
    fn test_order_prefers_success_rate() {
        let intel = DomainIntelligence::new(table());
        // Browser pool keeps failing, HTTP keeps succeeding.
        for _ in 0..4 {
            intel.record_outcome(
                "shop.com",
                StrategyKind::BrowserPool,
                false,
                Duration::from_millis(15_000),
            );
            intel.record_outcome(
                "shop.com",
                StrategyKind::BasicHttp,
                true,
                Duration::from_millis(800),
            );
        }
        let order = intel.strategy_order("shop.com");
        assert_eq!(order[0], StrategyKind::BasicHttp);
        // Advanced is unseen (0.5 prior) and ranks above the failing pool.
        assert_eq!(order[1], StrategyKind::Advanced);
        assert_eq!(order[2], StrategyKind::BrowserPool);
    }

    #[test]
    fn test_order_ties_break_on_latency() {
        let intel = DomainIntelligence::new(table());
        // Both strategies always succeed, HTTP is faster.
        for _ in 0..3 {
            intel.record_outcome(
                "tie.com",
                StrategyKind::BrowserPool,
                true,
                Duration::from_millis(9_000),
            );
            intel.record_outcome(
                "tie.com",
                StrategyKind::BasicHttp,
                true,
                Duration::from_millis(400),
            );
        }
        let order = intel.strategy_order("tie.com");
        assert_eq!(order[0], StrategyKind::BasicHttp);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("WWW.Example.COM"), "example.com");
        assert_eq!(normalize_host("shop.example.com"), "shop.example.com");
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        let intel = Arc::new(DomainIntelligence::new(table()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let intel = Arc::clone(&intel);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    intel.record_outcome(
                        if i % 2 == 0 { "a.com" } else { "b.com" },
                        StrategyKind::BasicHttp,
                        true,
                        Duration::from_millis(500),
                    );
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(intel.tracked_hosts(), 2);
        // 400 samples of 500ms each: EMA converges to 500ms → 2000ms floor
        assert_eq!(
            intel.get_timeout("a.com", StrategyKind::BasicHttp),
            Duration::from_millis(2_000)
        );
    }
}
