//! Pooled-browser strategy — primary layer for defended sites.
//!
//! Borrows one persistent stealth browser from the pool, opens a fresh page
//! with a randomized identity, waits a human-like beat, navigates, and
//! extracts the rendered HTML. The lease always returns to the pool — idle
//! on the happy path, crashed (with asynchronous respawn) when the browser
//! died underneath us.

use super::{FetchStrategy, FetchedContent, StrategyKind, MIN_CONTENT_LEN};
use crate::config::Mode;
use crate::error::{detect_challenge, FetchError};
use crate::pool::BrowserPool;
use crate::stealth::StealthProfile;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub struct BrowserPoolStrategy {
    pool: BrowserPool,
    borrow_timeout: Duration,
    mode: Mode,
}

impl BrowserPoolStrategy {
    pub fn new(pool: BrowserPool, borrow_timeout: Duration, mode: Mode) -> Self {
        Self {
            pool,
            borrow_timeout,
            mode,
        }
    }
}

#[async_trait]
impl FetchStrategy for BrowserPoolStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BrowserPool
    }

    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedContent, FetchError> {
        let start = Instant::now();

        // The borrow wait is bounded separately from the fetch, but never
        // outlives the layer budget.
        let borrow = self.borrow_timeout.min(timeout);
        let mut lease = self.pool.acquire(borrow).await?;

        let profile = StealthProfile::random(self.mode);
        let mut ctx = match lease.renderer().new_context(&profile).await {
            Ok(ctx) => ctx,
            Err(e) => {
                let err = FetchError::classify_browser(&e, start.elapsed());
                if matches!(err, FetchError::BrowserCrash(_)) || !lease.renderer().is_alive() {
                    lease.mark_crashed();
                }
                return Err(err);
            }
        };

        let remaining = timeout.saturating_sub(start.elapsed());
        let navigation = tokio::time::timeout(remaining, async {
            // Human-like pause before navigation; counts against the layer
            // budget and therefore the global deadline.
            tokio::time::sleep(profile.human_delay).await;
            ctx.navigate(url.as_str()).await?;
            ctx.html().await
        })
        .await;

        let _ = ctx.close().await;

        let outcome = match navigation {
            Err(_) => Err(FetchError::NetworkTimeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(FetchError::classify_browser(&e, start.elapsed())),
            Ok(Ok(html)) => {
                if let Some(signature) = detect_challenge(&html) {
                    Err(FetchError::BlockedByDefense(signature.to_string()))
                } else if html.len() < MIN_CONTENT_LEN {
                    Err(FetchError::BlockedByDefense(format!(
                        "insufficient content: {} bytes",
                        html.len()
                    )))
                } else {
                    debug!(%url, bytes = html.len(), "pooled browser fetch succeeded");
                    Ok(FetchedContent {
                        html,
                        insecure: false,
                    })
                }
            }
        };

        if matches!(outcome, Err(FetchError::BrowserCrash(_))) || !lease.renderer().is_alive() {
            lease.mark_crashed();
        }
        // Lease drops here, releasing the instance on every path.
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::renderer::{RenderContext, Renderer, RendererFactory};
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ScriptedRenderer {
        alive: AtomicBool,
        body: String,
        nav_error: Option<String>,
        nav_delay: Duration,
    }

    struct ScriptedContext {
        body: String,
        nav_error: Option<String>,
        nav_delay: Duration,
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn new_context(&self, _profile: &StealthProfile) -> Result<Box<dyn RenderContext>> {
            Ok(Box::new(ScriptedContext {
                body: self.body.clone(),
                nav_error: self.nav_error.clone(),
                nav_delay: self.nav_delay,
            }))
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }

        async fn shutdown(&self) -> Result<()> {
            self.alive.store(false, Ordering::Relaxed);
            Ok(())
        }
    }

    #[async_trait]
    impl RenderContext for ScriptedContext {
        async fn navigate(&mut self, _url: &str) -> Result<()> {
            tokio::time::sleep(self.nav_delay).await;
            match &self.nav_error {
                Some(msg) => Err(anyhow::anyhow!("{msg}")),
                None => Ok(()),
            }
        }

        async fn evaluate(&self, _script: &str) -> Result<()> {
            Ok(())
        }

        async fn html(&self) -> Result<String> {
            Ok(self.body.clone())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedFactory {
        body: String,
        nav_error: Option<String>,
        nav_delay: Duration,
    }

    #[async_trait]
    impl RendererFactory for ScriptedFactory {
        async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
            Ok(Box::new(ScriptedRenderer {
                alive: AtomicBool::new(true),
                body: self.body.clone(),
                nav_error: self.nav_error.clone(),
                nav_delay: self.nav_delay,
            }))
        }
    }

    async fn pool_with(factory: ScriptedFactory) -> BrowserPool {
        BrowserPool::initialize(1, Arc::new(factory), Mode::Testing).await
    }

    fn big_page() -> String {
        format!("<html><body>{}</body></html>", "x".repeat(1000))
    }

    #[tokio::test]
    async fn test_fetch_success_returns_instance() {
        let pool = pool_with(ScriptedFactory {
            body: big_page(),
            nav_error: None,
            nav_delay: Duration::ZERO,
        })
        .await;
        let strategy = BrowserPoolStrategy::new(pool.clone(), Duration::from_millis(200), Mode::Testing);

        let url = Url::parse("https://example.com").unwrap();
        let content = strategy.fetch(&url, Duration::from_secs(2)).await.unwrap();
        assert!(content.html.contains("<body>"));
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_reports_and_releases() {
        let pool = pool_with(ScriptedFactory {
            body: big_page(),
            nav_error: None,
            nav_delay: Duration::from_secs(5),
        })
        .await;
        let strategy = BrowserPoolStrategy::new(pool.clone(), Duration::from_millis(200), Mode::Testing);

        let url = Url::parse("https://slow.example.com").unwrap();
        let err = strategy
            .fetch(&url, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_crash_marks_lease_and_respawns() {
        let pool = pool_with(ScriptedFactory {
            body: big_page(),
            nav_error: Some("websocket connection closed".into()),
            nav_delay: Duration::ZERO,
        })
        .await;
        let strategy = BrowserPoolStrategy::new(pool.clone(), Duration::from_millis(200), Mode::Testing);

        let url = Url::parse("https://crashy.example.com").unwrap();
        let err = strategy.fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrowserCrash);

        // The crashed instance goes through respawn, not straight back to idle.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_challenge_page_is_blocked() {
        let pool = pool_with(ScriptedFactory {
            body: format!(
                "<html><title>Just a moment...</title>{}</html>",
                "x".repeat(600)
            ),
            nav_error: None,
            nav_delay: Duration::ZERO,
        })
        .await;
        let strategy = BrowserPoolStrategy::new(pool, Duration::from_millis(200), Mode::Testing);

        let url = Url::parse("https://walled.example.com").unwrap();
        let err = strategy.fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BlockedByDefense);
    }

    #[tokio::test]
    async fn test_exhausted_pool_fails_without_network() {
        let pool = pool_with(ScriptedFactory {
            body: big_page(),
            nav_error: None,
            nav_delay: Duration::ZERO,
        })
        .await;
        let _held = pool.acquire(Duration::from_millis(50)).await.unwrap();

        let strategy = BrowserPoolStrategy::new(pool.clone(), Duration::from_millis(50), Mode::Testing);
        let url = Url::parse("https://example.com").unwrap();
        let err = strategy.fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
    }
}
