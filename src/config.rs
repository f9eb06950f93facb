//! Engine configuration, read from the environment.
//!
//! The surface is enumerated, not free-form: acquisition mode, per-layer
//! timeouts, pool size, concurrency cap, cache tuning, and an optional
//! explicit Chromium path. Every value has a default tuned for a small
//! deployment; `Config::from_env` validates on load.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Acquisition mode. Production uses full human-like delays; development and
/// testing shrink them so local runs and test suites stay fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Testing,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Testing => "testing",
            Mode::Production => "production",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "testing" | "test" => Ok(Mode::Testing),
            "production" | "prod" => Ok(Mode::Production),
            other => bail!("unknown mode {other:?} (expected development|testing|production)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Number of persistent pooled browser instances.
    pub pool_size: usize,
    /// Maximum concurrent acquisitions; requests beyond it wait.
    pub max_concurrent: usize,
    /// Static per-layer timeout for the pooled-browser strategy.
    pub browser_timeout: Duration,
    /// Static per-layer timeout for the advanced strategy (longest budget —
    /// it expects to negotiate heavy JavaScript challenges).
    pub advanced_timeout: Duration,
    /// Static per-layer timeout for plain HTTP (strictest budget).
    pub http_timeout: Duration,
    /// How long a strategy waits for an idle pooled browser.
    pub borrow_timeout: Duration,
    /// Floor of the adaptive-timeout envelope.
    pub timeout_floor: Duration,
    /// Ceiling of the adaptive-timeout envelope.
    pub timeout_ceiling: Duration,
    /// Result-cache capacity (entries).
    pub cache_capacity: usize,
    /// Result-cache TTL.
    pub cache_ttl: Duration,
    /// Explicit Chromium binary path, overriding discovery.
    pub chromium_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            pool_size: 3,
            max_concurrent: 2,
            browser_timeout: Duration::from_millis(15_000),
            advanced_timeout: Duration::from_millis(20_000),
            http_timeout: Duration::from_millis(5_000),
            borrow_timeout: Duration::from_millis(5_000),
            timeout_floor: Duration::from_millis(2_000),
            timeout_ceiling: Duration::from_millis(30_000),
            cache_capacity: 1_000,
            cache_ttl: Duration::from_secs(3_600),
            chromium_path: None,
        }
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{name} must be an integer, got {v:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Build a configuration from `FORAGER_*` environment variables,
    /// falling back to defaults, then validate it.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let mode = match std::env::var("FORAGER_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.mode,
        };

        let config = Config {
            mode,
            pool_size: env_u64("FORAGER_POOL_SIZE", defaults.pool_size as u64)? as usize,
            max_concurrent: env_u64("FORAGER_MAX_CONCURRENT", defaults.max_concurrent as u64)?
                as usize,
            browser_timeout: Duration::from_millis(env_u64(
                "FORAGER_BROWSER_TIMEOUT_MS",
                defaults.browser_timeout.as_millis() as u64,
            )?),
            advanced_timeout: Duration::from_millis(env_u64(
                "FORAGER_ADVANCED_TIMEOUT_MS",
                defaults.advanced_timeout.as_millis() as u64,
            )?),
            http_timeout: Duration::from_millis(env_u64(
                "FORAGER_HTTP_TIMEOUT_MS",
                defaults.http_timeout.as_millis() as u64,
            )?),
            borrow_timeout: Duration::from_millis(env_u64(
                "FORAGER_BORROW_TIMEOUT_MS",
                defaults.borrow_timeout.as_millis() as u64,
            )?),
            timeout_floor: Duration::from_millis(env_u64(
                "FORAGER_TIMEOUT_MIN_MS",
                defaults.timeout_floor.as_millis() as u64,
            )?),
            timeout_ceiling: Duration::from_millis(env_u64(
                "FORAGER_TIMEOUT_MAX_MS",
                defaults.timeout_ceiling.as_millis() as u64,
            )?),
            cache_capacity: env_u64("FORAGER_CACHE_SIZE", defaults.cache_capacity as u64)? as usize,
            cache_ttl: Duration::from_secs(env_u64(
                "FORAGER_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            chromium_path: std::env::var("FORAGER_CHROMIUM_PATH").ok().map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            bail!("FORAGER_POOL_SIZE must be >= 1");
        }
        if self.max_concurrent == 0 {
            bail!("FORAGER_MAX_CONCURRENT must be >= 1");
        }
        if self.timeout_floor > self.timeout_ceiling {
            bail!(
                "FORAGER_TIMEOUT_MIN_MS ({:?}) must not exceed FORAGER_TIMEOUT_MAX_MS ({:?})",
                self.timeout_floor,
                self.timeout_ceiling
            );
        }
        if self.http_timeout.is_zero()
            || self.browser_timeout.is_zero()
            || self.advanced_timeout.is_zero()
        {
            bail!("per-layer timeouts must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("production".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("DEV".parse::<Mode>().unwrap(), Mode::Development);
        assert!("staging".parse::<Mode>().is_err());
    }

    #[test]
    fn test_rejects_zero_pool() {
        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_envelope() {
        let config = Config {
            timeout_floor: Duration::from_secs(60),
            timeout_ceiling: Duration::from_secs(1),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
