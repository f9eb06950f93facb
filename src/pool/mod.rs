//! Browser pool — a fixed arena of persistent headless-browser instances.
//!
//! Each slot holds a state tag (`Idle`/`Busy`/`Crashed`/`Respawning`);
//! acquire and release are the only mutation points, so no slot can be
//! borrowed twice and a crashed instance is never handed out before its
//! respawn completes. A semaphore carries exactly one permit per idle
//! instance; the permit is forgotten on borrow and restored when the slot
//! returns to `Idle`.

use crate::config::Mode;
use crate::error::FetchError;
use crate::renderer::{Renderer, RendererFactory};
use crate::stealth::StealthProfile;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

const RESPAWN_ATTEMPTS: u32 = 3;
const RESPAWN_BACKOFF: Duration = Duration::from_millis(500);

enum SlotState {
    Idle(Arc<dyn Renderer>),
    Busy,
    Crashed,
    Respawning,
}

struct PoolInner {
    slots: Mutex<Vec<SlotState>>,
    available: Semaphore,
    factory: Arc<dyn RendererFactory>,
    mode: Mode,
}

impl PoolInner {
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<SlotState>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release_idle(&self, slot: usize, renderer: Arc<dyn Renderer>) {
        {
            let mut slots = self.lock_slots();
            slots[slot] = SlotState::Idle(renderer);
        }
        self.available.add_permits(1);
    }

    fn begin_respawn(inner: Arc<Self>, slot: usize, old: Option<Arc<dyn Renderer>>) {
        {
            let mut slots = inner.lock_slots();
            slots[slot] = SlotState::Crashed;
        }
        // Respawn runs detached; the permit stays withheld until the slot is
        // idle again, so nobody can borrow it meanwhile.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(old) = old {
                        let _ = old.shutdown().await;
                    }
                    inner.respawn(slot).await;
                });
            }
            Err(_) => {
                warn!(slot, "no runtime available for respawn; slot stays crashed");
            }
        }
    }

    async fn respawn(self: Arc<Self>, slot: usize) {
        {
            let mut slots = self.lock_slots();
            slots[slot] = SlotState::Respawning;
        }

        for attempt in 1..=RESPAWN_ATTEMPTS {
            let profile = StealthProfile::random(self.mode);
            match self.factory.launch(&profile).await {
                Ok(renderer) => {
                    {
                        let mut slots = self.lock_slots();
                        slots[slot] = SlotState::Idle(Arc::from(renderer));
                    }
                    self.available.add_permits(1);
                    info!(slot, attempt, "browser instance respawned");
                    return;
                }
                Err(e) => {
                    warn!(slot, attempt, "browser respawn failed: {e:#}");
                    tokio::time::sleep(RESPAWN_BACKOFF * 2u32.pow(attempt - 1)).await;
                }
            }
        }

        {
            let mut slots = self.lock_slots();
            slots[slot] = SlotState::Crashed;
        }
        error!(slot, "browser slot permanently down after {RESPAWN_ATTEMPTS} respawn attempts");
    }
}

/// Occupancy snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub busy: usize,
    pub crashed: usize,
    pub respawning: usize,
}

#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
    capacity: usize,
}

impl BrowserPool {
    /// Launch up to `capacity` instances. Launch failures park their slot as
    /// crashed and shrink the effective pool; with zero live instances the
    /// pool still works, every borrow just reports exhaustion.
    pub async fn initialize(
        capacity: usize,
        factory: Arc<dyn RendererFactory>,
        mode: Mode,
    ) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let mut launched = 0usize;

        for slot in 0..capacity {
            let profile = StealthProfile::random(mode);
            match factory.launch(&profile).await {
                Ok(renderer) => {
                    slots.push(SlotState::Idle(Arc::from(renderer)));
                    launched += 1;
                }
                Err(e) => {
                    warn!(slot, "failed to launch pooled browser: {e:#}");
                    slots.push(SlotState::Crashed);
                }
            }
        }

        if launched == 0 {
            warn!("browser pool has no live instances; browser strategies will report exhaustion");
        } else {
            info!(launched, capacity, "browser pool initialized");
        }

        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(slots),
                available: Semaphore::new(launched),
                factory,
                mode,
            }),
            capacity,
        }
    }

    /// Borrow an idle instance, waiting at most `borrow_timeout`.
    pub async fn acquire(&self, borrow_timeout: Duration) -> Result<BrowserLease, FetchError> {
        let permit = match tokio::time::timeout(borrow_timeout, self.inner.available.acquire())
            .await
        {
            Err(_) => return Err(FetchError::PoolExhausted),
            Ok(Err(_)) => return Err(FetchError::PoolExhausted),
            Ok(Ok(permit)) => permit,
        };
        permit.forget();

        let mut slots = self.inner.lock_slots();
        let idx = slots
            .iter()
            .position(|s| matches!(s, SlotState::Idle(_)));
        let Some(idx) = idx else {
            // Permit/slot accounting guarantees an idle slot here; restore
            // the permit rather than deadlock if that ever breaks.
            drop(slots);
            self.inner.available.add_permits(1);
            return Err(FetchError::PoolExhausted);
        };
        let SlotState::Idle(renderer) = std::mem::replace(&mut slots[idx], SlotState::Busy) else {
            unreachable!("slot state changed under lock");
        };
        drop(slots);

        Ok(BrowserLease {
            inner: Arc::clone(&self.inner),
            slot: idx,
            renderer: Some(renderer),
            crashed: false,
        })
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.lock_slots();
        let mut stats = PoolStats {
            capacity: self.capacity,
            idle: 0,
            busy: 0,
            crashed: 0,
            respawning: 0,
        };
        for s in slots.iter() {
            match s {
                SlotState::Idle(_) => stats.idle += 1,
                SlotState::Busy => stats.busy += 1,
                SlotState::Crashed => stats.crashed += 1,
                SlotState::Respawning => stats.respawning += 1,
            }
        }
        stats
    }

    /// Shut down all idle instances and refuse further borrows.
    pub async fn shutdown(&self) {
        self.inner.available.close();
        let idle: Vec<Arc<dyn Renderer>> = {
            let mut slots = self.inner.lock_slots();
            slots
                .iter_mut()
                .filter(|s| matches!(s, SlotState::Idle(_)))
                .map(|s| {
                    let SlotState::Idle(r) = std::mem::replace(s, SlotState::Crashed) else {
                        unreachable!()
                    };
                    r
                })
                .collect()
        };
        for renderer in idle {
            let _ = renderer.shutdown().await;
        }
    }
}

/// Exclusive borrow of one pooled browser instance.
///
/// Dropping the lease returns the instance: back to `Idle` normally, or into
/// respawn when it was marked crashed (or its process died underneath us).
pub struct BrowserLease {
    inner: Arc<PoolInner>,
    slot: usize,
    renderer: Option<Arc<dyn Renderer>>,
    crashed: bool,
}

impl BrowserLease {
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        // The renderer is only taken in Drop.
        self.renderer.as_ref().expect("lease already released")
    }

    /// Report the borrowed instance dead; drop will route it into respawn.
    pub fn mark_crashed(&mut self) {
        self.crashed = true;
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if self.crashed || !renderer.is_alive() {
                PoolInner::begin_respawn(Arc::clone(&self.inner), self.slot, Some(renderer));
            } else {
                self.inner.release_idle(self.slot, renderer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockRenderer {
        alive: AtomicBool,
    }

    #[async_trait]
    impl Renderer for MockRenderer {
        async fn new_context(
            &self,
            _profile: &StealthProfile,
        ) -> Result<Box<dyn crate::renderer::RenderContext>> {
            Err(anyhow::anyhow!("mock renderer has no contexts"))
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Relaxed)
        }

        async fn shutdown(&self) -> Result<()> {
            self.alive.store(false, Ordering::Relaxed);
            Ok(())
        }
    }

    struct MockFactory {
        launches: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl MockFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                launches: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            })
        }

        fn failing_first(n: usize) -> Arc<Self> {
            Arc::new(Self {
                launches: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(n),
            })
        }
    }

    #[async_trait]
    impl RendererFactory for MockFactory {
        async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn Renderer>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow::anyhow!("mock launch failure"));
            }
            Ok(Box::new(MockRenderer {
                alive: AtomicBool::new(true),
            }))
        }
    }

    #[tokio::test]
    async fn test_borrow_and_release() {
        let pool = BrowserPool::initialize(2, MockFactory::new(), Mode::Testing).await;
        assert_eq!(pool.stats().idle, 2);

        let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(pool.stats().busy, 1);
        assert_eq!(pool.stats().idle, 1);

        drop(lease);
        assert_eq!(pool.stats().idle, 2);
    }

    #[tokio::test]
    async fn test_no_double_borrow() {
        let pool = BrowserPool::initialize(1, MockFactory::new(), Mode::Testing).await;

        let lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let second = pool.acquire(Duration::from_millis(50)).await;
        assert!(matches!(second, Err(FetchError::PoolExhausted)));

        drop(lease);
        let third = pool.acquire(Duration::from_millis(50)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let pool = BrowserPool::initialize(1, MockFactory::new(), Mode::Testing).await;
        let lease = pool.acquire(Duration::from_millis(50)).await.unwrap();

        let pool2 = pool.clone();
        let waiter =
            tokio::spawn(async move { pool2.acquire(Duration::from_millis(500)).await.is_ok() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(lease);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_crashed_instance_respawns_before_reuse() {
        let factory = MockFactory::new();
        let pool = BrowserPool::initialize(1, factory.clone(), Mode::Testing).await;

        let mut lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        lease.mark_crashed();
        drop(lease);

        // Respawn runs asynchronously; the slot must not be borrowable until
        // it finishes.
        let lease = pool.acquire(Duration::from_millis(1_000)).await.unwrap();
        assert!(lease.renderer().is_alive());
        assert_eq!(factory.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_launch_failures_shrink_pool() {
        let pool =
            BrowserPool::initialize(2, MockFactory::failing_first(1), Mode::Testing).await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.crashed, 1);

        // Only one instance is ever available.
        let _lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let second = pool.acquire(Duration::from_millis(50)).await;
        assert!(matches!(second, Err(FetchError::PoolExhausted)));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_borrows() {
        let pool = BrowserPool::initialize(1, MockFactory::new(), Mode::Testing).await;
        pool.shutdown().await;
        let res = pool.acquire(Duration::from_millis(50)).await;
        assert!(matches!(res, Err(FetchError::PoolExhausted)));
    }

    #[tokio::test]
    async fn test_dead_renderer_detected_on_release() {
        let factory = MockFactory::new();
        let pool = BrowserPool::initialize(1, factory.clone(), Mode::Testing).await;

        let lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        // Process dies while borrowed; the strategy never notices.
        lease.renderer().shutdown().await.unwrap();
        drop(lease);

        // Next borrow must get a respawned, live instance.
        let lease = pool.acquire(Duration::from_millis(1_000)).await.unwrap();
        assert!(lease.renderer().is_alive());
    }
}
