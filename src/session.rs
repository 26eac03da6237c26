//! Shared session state: one cancellation token and the steady-state
//! pipeline counters.
//!
//! Every shutdown trigger (signal, byte limit, JACK shutdown callback,
//! interactive quit) converges on `Session::cancel`; actual teardown
//! happens on the main task once it observes the token.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Process-wide cancellation handle. Cloning is cheap; all clones
/// observe the same token.
#[derive(Clone)]
pub struct Session {
    token: CancellationToken,
}

impl Session {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Idempotent. Safe to call from any thread, including the JACK
    /// callbacks (it is a plain atomic store plus waker wakeups).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters shared between the capture thread, the render callback and
/// the periodic stats log. Overruns and underruns are explicit,
/// counted, non-fatal conditions.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub bytes_captured: AtomicU64,
    pub bytes_queued: AtomicU64,
    pub bytes_dropped: AtomicU64,
    pub overruns: AtomicU64,
    pub underruns: AtomicU64,
}

impl PipelineStats {
    pub fn record_captured(&self, bytes: u64) {
        self.bytes_captured.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_queued(&self, bytes: u64) {
        self.bytes_queued.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Producer-side drop: the decimated chunk did not fit the ring.
    pub fn record_overrun(&self, dropped: u64) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.bytes_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Consumer-side silence substitution.
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_captured(&self) -> u64 {
        self.bytes_captured.load(Ordering::Relaxed)
    }

    pub fn get_queued(&self) -> u64 {
        self.bytes_queued.load(Ordering::Relaxed)
    }

    pub fn get_dropped(&self) -> u64 {
        self.bytes_dropped.load(Ordering::Relaxed)
    }

    pub fn get_overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn get_underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
