//! Graceful shutdown for refresh loops.
//!
//! Once shutdown is signalled, refresh loops stop starting new cycles. A
//! cycle already talking to the store holds a [`CycleGuard`] and may finish
//! within the grace period.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshsync_runtime::{wait_for_signal, ShutdownController};
//! use std::time::Duration;
//!
//! let controller = ShutdownController::new();
//! let handles = manager.spawn_all(&controller);
//!
//! wait_for_signal().await?;
//! controller.shutdown(Duration::from_secs(30)).await;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tracing::{info, warn};

/// Stops refresh loops and waits for their in-flight cycles.
///
/// Clones share state; hand one to every loop.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    stopped: watch::Sender<bool>,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a controller in the running state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: watch::Sender::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.stopped.subscribe()
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        *self.inner.stopped.borrow()
    }

    /// Future-like handle that resolves once shutdown is signalled.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.subscribe(),
        }
    }

    /// Signal shutdown and wait up to `grace_period` for in-flight cycles.
    ///
    /// Returns `false` if cycles were still running when the grace period
    /// ran out. Calling it again after the first call returns `true` at once.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        if self.inner.stopped.send_replace(true) {
            return true;
        }
        info!(grace_period = ?grace_period, in_flight = self.cycles_in_flight(), "stopping refresh loops");

        if timeout(grace_period, self.drained()).await.is_ok() {
            info!("refresh loops stopped");
            return true;
        }
        warn!(
            in_flight = self.cycles_in_flight(),
            "grace period elapsed with refresh cycles in flight"
        );
        false
    }

    async fn drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            if self.cycles_in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Mark a cycle as in flight until the guard drops.
    pub fn begin_cycle(&self) -> CycleGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        CycleGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Cycles currently in flight.
    pub fn cycles_in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }
}

/// An in-flight refresh cycle. See [`ShutdownController::begin_cycle`].
#[derive(Debug)]
pub struct CycleGuard {
    inner: Arc<Inner>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

/// Resolves once shutdown is signalled.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn wait(mut self) {
        // A dropped controller counts as shutdown.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere).
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}
