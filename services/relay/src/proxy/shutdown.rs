//! Stop signal and coordinated shutdown.
//!
//! The stop signal is a process-wide one-shot latch: it transitions from
//! open to stopped exactly once, and every holder observes the
//! transition. The coordinator waits for a termination trigger, latches
//! the signal so the acceptor stops admitting, and force-closes every
//! connection the registry still tracks.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

use super::registry::Registry;

/// Process-wide one-shot stop latch.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Create an open (not yet stopped) signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Latch the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has latched.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal latches. Resolves immediately if it already
    /// has.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so this cannot fail while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Reacts to a termination trigger by stopping admissions and
/// force-closing every registered connection.
pub struct ShutdownCoordinator {
    stop: StopSignal,
    registry: Arc<Registry>,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the shared stop signal and registry.
    pub fn new(stop: StopSignal, registry: Arc<Registry>) -> Self {
        Self { stop, registry }
    }

    /// Wait for SIGINT, SIGTERM, or a programmatic stop, then shut down.
    pub async fn run(self) {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                None
            }
        };
        let terminated = async {
            match terminate.as_mut() {
                Some(sig) => {
                    sig.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            interrupt = tokio::signal::ctrl_c() => match interrupt {
                Ok(()) => info!("Received interrupt signal, shutting down"),
                Err(e) => warn!(error = %e, "Interrupt handler failed, shutting down"),
            },
            _ = terminated => info!("Received terminate signal, shutting down"),
            _ = self.stop.stopped() => info!("Received stop request, shutting down"),
        }

        self.shutdown().await;
    }

    /// Stop admissions and force-close all active connections.
    ///
    /// Performed once; a second call finds the registry already empty.
    pub async fn shutdown(&self) {
        self.stop.trigger();
        let closed = self.registry.close_all().await;
        info!(
            connections_closed = closed,
            "All connections have been closed, shutdown complete"
        );
    }
}
