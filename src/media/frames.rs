//! Frame Scheduling für die Pegel-Abtastung
//!
//! Die Sampling-Schleife wartet pro Iteration auf den nächsten Frame der
//! Umgebung statt einen eigenen Timer zu besitzen.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Frame-Periode bei ~60 fps
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Liefert Frames an die Sampling-Schleife
#[async_trait]
pub trait FrameScheduler: Send + Sync {
    /// Wartet auf den nächsten Frame
    async fn next_frame(&self);
}

// ============================================================================
// INTERVAL FRAMES
// ============================================================================

/// Frames in fester Periode über `tokio::time`
#[derive(Debug, Clone)]
pub struct IntervalFrames {
    period: Duration,
}

impl IntervalFrames {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalFrames {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

#[async_trait]
impl FrameScheduler for IntervalFrames {
    async fn next_frame(&self) {
        tokio::time::sleep(self.period).await;
    }
}

// ============================================================================
// MANUAL FRAMES
// ============================================================================

#[derive(Default)]
struct ManualInner {
    notify: Notify,
    requested: AtomicUsize,
    waiting: AtomicUsize,
}

/// Frames werden explizit per `tick()` ausgelöst (Headless-Betrieb, Tests)
#[derive(Clone, Default)]
pub struct ManualFrames {
    inner: Arc<ManualInner>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gibt alle wartenden Schleifen frei
    pub fn tick(&self) {
        self.inner.notify.notify_waiters();
    }

    /// Wie oft ein Frame angefordert wurde
    pub fn requested(&self) -> usize {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Wie viele Schleifen gerade auf einen Frame warten
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ManualFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFrames")
            .field("requested", &self.requested())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Zählt wartende Schleifen, auch wenn die Schleife abgebrochen wird
struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameScheduler for ManualFrames {
    async fn next_frame(&self) {
        self.inner.requested.fetch_add(1, Ordering::SeqCst);
        let _guard = WaitGuard::enter(&self.inner.waiting);
        self.inner.notify.notified().await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
