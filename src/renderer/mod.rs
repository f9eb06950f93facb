//! Browser-engine abstraction.
//!
//! `Renderer` is one live browser process, `RenderContext` one page in it,
//! `RendererFactory` knows how to launch new processes. The pool and both
//! browser strategies work against these traits, which keeps the engine
//! testable without a real Chromium.

pub mod chromium;

use crate::stealth::StealthProfile;
use anyhow::Result;
use async_trait::async_trait;

/// A live browser process that can open page contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh page configured with the given stealth profile.
    async fn new_context(&self, profile: &StealthProfile) -> Result<Box<dyn RenderContext>>;

    /// Whether the underlying process is still reachable. A dead renderer
    /// must never be handed to another borrower.
    fn is_alive(&self) -> bool;

    /// Tear down the browser process.
    async fn shutdown(&self) -> Result<()>;
}

/// A single page within a browser process.
#[async_trait]
pub trait RenderContext: Send {
    /// Navigate and wait for the load to settle. Unbounded; callers wrap it
    /// in their own timeout.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Run a script in the page, discarding its value.
    async fn evaluate(&self, script: &str) -> Result<()>;

    /// Full serialized page HTML.
    async fn html(&self) -> Result<String>;

    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches browser processes.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self, profile: &StealthProfile) -> Result<Box<dyn Renderer>>;
}

/// Renderer used when no browser is available. Browser strategies fail fast
/// and the chain falls through to plain HTTP.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self, _profile: &StealthProfile) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available, HTTP-only mode"))
    }

    fn is_alive(&self) -> bool {
        // No process behind it, so nothing that can crash.
        true
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory yielding [`NoopRenderer`]s, installed when no Chromium binary can
/// be found so the engine still serves HTTP-only acquisitions.
pub struct NoopFactory;

#[async_trait]
impl RendererFactory for NoopFactory {
    async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
        Ok(Box::new(NoopRenderer))
    }
}
