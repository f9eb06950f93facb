//! Advanced strategy — a private stealth browser per call.
//!
//! More expensive than the pooled layer and slower to start, but every call
//! gets a pristine fingerprint: fresh process, deeper anti-detection launch
//! flags, rotated identity, and human-behavior simulation after load. The
//! private browser is torn down on every exit path; nothing persists
//! between calls.

use super::{FetchStrategy, FetchedContent, StrategyKind, MIN_CONTENT_LEN};
use crate::config::Mode;
use crate::error::{detect_challenge, FetchError};
use crate::renderer::RendererFactory;
use crate::stealth::{StealthProfile, SCROLL_SCRIPT};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub struct AdvancedStrategy {
    factory: Arc<dyn RendererFactory>,
    mode: Mode,
}

impl AdvancedStrategy {
    pub fn new(factory: Arc<dyn RendererFactory>, mode: Mode) -> Self {
        Self { factory, mode }
    }
}

#[async_trait]
impl FetchStrategy for AdvancedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Advanced
    }

    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedContent, FetchError> {
        let start = Instant::now();
        let profile = StealthProfile::random(self.mode);

        let renderer = self
            .factory
            .launch(&profile)
            .await
            .map_err(|e| FetchError::classify_browser(&e, start.elapsed()))?;

        let remaining = timeout.saturating_sub(start.elapsed());
        let navigation = tokio::time::timeout(remaining, async {
            let mut ctx = renderer.new_context(&profile).await?;
            tokio::time::sleep(profile.human_delay).await;
            ctx.navigate(url.as_str()).await?;
            // Reading-speed scroll triggers lazy content and feeds the
            // behavioral classifiers something plausible.
            let _ = ctx.evaluate(SCROLL_SCRIPT).await;
            let html = ctx.html().await?;
            let _ = ctx.close().await;
            Ok::<String, anyhow::Error>(html)
        })
        .await;

        // Guaranteed teardown, timeout included — the whole process goes
        // away along with any half-open page.
        let _ = renderer.shutdown().await;

        let html = match navigation {
            Err(_) => {
                return Err(FetchError::NetworkTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => return Err(FetchError::classify_browser(&e, start.elapsed())),
            Ok(Ok(html)) => html,
        };

        if let Some(signature) = detect_challenge(&html) {
            return Err(FetchError::BlockedByDefense(signature.to_string()));
        }
        if html.len() < MIN_CONTENT_LEN {
            return Err(FetchError::BlockedByDefense(format!(
                "insufficient content: {} bytes",
                html.len()
            )));
        }

        debug!(%url, bytes = html.len(), "advanced fetch succeeded");
        Ok(FetchedContent {
            html,
            insecure: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::renderer::{RenderContext, Renderer};
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct OneShotRenderer {
        alive: AtomicBool,
        shutdowns: Arc<AtomicUsize>,
        body: String,
        nav_delay: Duration,
    }

    struct OneShotContext {
        body: String,
        nav_delay: Duration,
    }

    #[async_trait]
    impl Renderer for OneShotRenderer {
        async fn new_context(&self, _profile: &StealthProfile) -> Result<Box<dyn RenderContext>> {
            Ok(Box::new(OneShotContext {
                body: self.body.clone(),
                nav_delay: self.nav_delay,
            }))
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }

        async fn shutdown(&self) -> Result<()> {
            self.alive.store(false, Ordering::Relaxed);
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl RenderContext for OneShotContext {
        async fn navigate(&mut self, _url: &str) -> Result<()> {
            tokio::time::sleep(self.nav_delay).await;
            Ok(())
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

    struct OneShotFactory {
        shutdowns: Arc<AtomicUsize>,
        body: String,
        nav_delay: Duration,
    }

    #[async_trait]
    impl RendererFactory for OneShotFactory {
        async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
            Ok(Box::new(OneShotRenderer {
                alive: AtomicBool::new(true),
                shutdowns: Arc::clone(&self.shutdowns),
                body: self.body.clone(),
                nav_delay: self.nav_delay,
            }))
        }
    }

    #[tokio::test]
    async fn test_success_tears_down_browser() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let strategy = AdvancedStrategy::new(
            Arc::new(OneShotFactory {
                shutdowns: Arc::clone(&shutdowns),
                body: format!("<html>{}</html>", "x".repeat(1000)),
                nav_delay: Duration::ZERO,
            }),
            Mode::Testing,
        );

        let url = Url::parse("https://example.com").unwrap();
        let content = strategy.fetch(&url, Duration::from_secs(2)).await.unwrap();
        assert!(content.html.len() > MIN_CONTENT_LEN);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_still_tears_down_browser() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let strategy = AdvancedStrategy::new(
            Arc::new(OneShotFactory {
                shutdowns: Arc::clone(&shutdowns),
                body: format!("<html>{}</html>", "x".repeat(1000)),
                nav_delay: Duration::from_secs(5),
            }),
            Mode::Testing,
        );

        let url = Url::parse("https://slow.example.com").unwrap();
        let err = strategy
            .fetch(&url, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        struct FailingFactory;

        #[async_trait]
        impl RendererFactory for FailingFactory {
            async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
                Err(anyhow::anyhow!("Chromium not found"))
            }
        }

        let strategy = AdvancedStrategy::new(Arc::new(FailingFactory), Mode::Testing);
        let url = Url::parse("https://example.com").unwrap();
        let err = strategy.fetch(&url, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
}
