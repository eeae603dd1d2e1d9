//! Registry of active client connections.
//!
//! The acceptor inserts one entry per admitted pair; the shutdown path
//! drains the whole set and fires each pair's force-close handle. The
//! shut-down flag and the map live under one lock, so an insertion can
//! never slip in after draining has started.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Default)]
struct Inner {
    shut_down: bool,
    conns: HashMap<SocketAddr, oneshot::Sender<()>>,
}

/// Concurrency-safe set of active client connections, keyed by peer
/// address.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the force-close handle for an admitted pair.
    ///
    /// Returns `false` once shutdown has begun; the caller must drop the
    /// connection instead of relaying it.
    pub async fn insert(&self, peer: SocketAddr, closer: oneshot::Sender<()>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.shut_down {
            return false;
        }
        inner.conns.insert(peer, closer);
        true
    }

    /// Remove a pair that has terminated.
    pub async fn remove(&self, peer: &SocketAddr) {
        self.inner.lock().await.conns.remove(peer);
    }

    /// Number of currently tracked connections.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.conns.len()
    }

    /// Whether no connections are tracked.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.conns.is_empty()
    }

    /// Force-close every tracked connection and refuse further insertions.
    ///
    /// Returns how many connections were signaled. Later calls find the
    /// registry empty and return zero.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.shut_down = true;
            inner.conns.drain().collect()
        };
        let count = drained.len();
        for (_, closer) in drained {
            // The pair may have terminated on its own in the meantime.
            let _ = closer.send(());
        }
        count
    }
}
