//! Chromium-backed renderer using chromiumoxide.

use super::{RenderContext, Renderer, RendererFactory};
use crate::stealth::{self, StealthProfile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path from config
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    // 2. FORAGER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FORAGER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.forager/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".forager/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".forager/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".forager/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".forager/chromium/chrome-linux64/chrome"),
                home.join(".forager/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches stealth-configured Chromium processes.
///
/// `advanced` selects the heavier anti-detection flag set used by the
/// private-browser strategy.
#[derive(Clone)]
pub struct ChromiumFactory {
    chromium_path: Option<PathBuf>,
    advanced: bool,
}

impl ChromiumFactory {
    pub fn new(chromium_path: Option<PathBuf>, advanced: bool) -> Self {
        Self {
            chromium_path,
            advanced,
        }
    }
}

#[async_trait]
impl RendererFactory for ChromiumFactory {
    async fn launch(&self, profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
        let chrome_path = find_chromium(self.chromium_path.as_deref())
            .context("Chromium not found — set FORAGER_CHROMIUM_PATH or install Chrome")?;

        let (width, height) = profile.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .window_size(width, height)
            .arg(format!("--user-agent={}", profile.user_agent))
            .arg(format!("--lang={}", profile.accept_language));
        for arg in stealth::launch_args(self.advanced) {
            builder = builder.arg(arg);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_flag = Arc::clone(&alive);
        // The handler loop ends when the browser process dies; that is our
        // crash signal.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
            alive_flag.store(false, Ordering::Relaxed);
        });

        debug!(
            viewport = ?profile.viewport,
            advanced = self.advanced,
            "launched Chromium instance"
        );

        Ok(Box::new(ChromiumRenderer {
            browser: Mutex::new(browser),
            alive,
        }))
    }
}

/// One headless Chromium process.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, profile: &StealthProfile) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        // Inject the mask before any page script can observe the environment.
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            stealth::MASK_SCRIPT,
        ))
        .await
        .context("failed to install mask script")?;

        // Viewport is fixed at launch; the user-agent rotates per context.
        page.execute(SetUserAgentOverrideParams::new(profile.user_agent.clone()))
            .await
            .context("failed to override user agent")?;

        Ok(Box::new(ChromiumContext { page }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("browser close error: {e}");
        }
        self.alive.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// A single Chromium page.
pub struct ChromiumContext {
    page: Page,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow::anyhow!("navigation failed: {e}"))?;
        // Settle redirects and client-side navigation before extraction.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("script evaluation failed: {e}"))
    }

    async fn html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("failed to get page content: {e}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_fetch_roundtrip() {
        let factory = ChromiumFactory::new(None, false);
        let profile = StealthProfile::random(Mode::Testing);
        let renderer = factory.launch(&profile).await.expect("launch failed");
        assert!(renderer.is_alive());

        let mut ctx = renderer
            .new_context(&profile)
            .await
            .expect("context creation failed");
        ctx.navigate("data:text/html,<h1>Hello</h1><p>World</p>")
            .await
            .expect("navigation failed");

        let html = ctx.html().await.expect("html extraction failed");
        assert!(html.contains("<h1>Hello</h1>"));

        ctx.close().await.expect("close failed");
        renderer.shutdown().await.expect("shutdown failed");
    }
}
