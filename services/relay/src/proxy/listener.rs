//! The acceptor: binds the listening socket, admits connections, and
//! spawns one handler task per relayed pair.
//!
//! The accept loop is a single task. Capacity rejections close the client
//! immediately without dialing the backend; transient accept errors are
//! logged and survived; once the stop signal latches, the loop drains the
//! registry and returns, closing the listening socket on the way out.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};

use super::admission::Admission;
use super::error::RelayError;
use super::registry::Registry;
use super::relay::{Relay, DEFAULT_DIAL_TIMEOUT};
use super::shutdown::StopSignal;

/// Default maximum concurrent connection pairs.
pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// Default idle timeout for a pair.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind to.
    pub listen_addr: SocketAddr,
    /// Backend address dialed for every accepted client.
    pub backend_addr: SocketAddr,
    /// Maximum concurrent connection pairs.
    pub max_connections: usize,
    /// Inactivity window before a pair is forcibly closed.
    pub idle_timeout: Duration,
    /// Deadline for dialing the backend.
    pub dial_timeout: Duration,
}

impl ProxyConfig {
    /// Create a configuration with default limits and timeouts.
    pub fn new(listen_addr: SocketAddr, backend_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            backend_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

/// Statistics for the proxy.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Total connections accepted and admitted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being relayed.
    pub connections_active: AtomicU64,
    /// Total pairs that have terminated.
    pub connections_closed: AtomicU64,
    /// Connections rejected at capacity.
    pub connections_rejected: AtomicU64,
    /// Backend dial failures.
    pub dial_failures: AtomicU64,
    /// Pairs closed by the idle watchdog.
    pub idle_timeouts: AtomicU64,
    /// Bytes relayed client -> backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed backend -> client.
    pub bytes_from_backend: AtomicU64,
}

/// The accepting proxy: listener, admission gate, relay, and registry.
pub struct Proxy {
    config: ProxyConfig,
    listener: TcpListener,
    admission: Admission,
    relay: Relay,
    registry: Arc<Registry>,
    stop: StopSignal,
    stats: Arc<ProxyStats>,
}

impl Proxy {
    /// Bind the listening socket. The only process-fatal failure.
    pub async fn bind(
        config: ProxyConfig,
        registry: Arc<Registry>,
        stop: StopSignal,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| RelayError::Bind {
            addr: config.listen_addr,
            source,
        })?;

        info!(
            listen_addr = %local_addr,
            backend_addr = %config.backend_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        let stats = Arc::new(ProxyStats::default());
        Ok(Self {
            admission: Admission::new(config.max_connections),
            relay: Relay::new(
                config.backend_addr,
                config.dial_timeout,
                config.idle_timeout,
                Arc::clone(&stats),
            ),
            listener,
            config,
            registry,
            stop,
            stats,
        })
    }

    /// Get the local address this proxy is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get proxy statistics.
    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    /// Run the accept loop until the stop signal latches.
    ///
    /// Returning drops the listener, which closes the listening socket.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(
            listen_addr = %local_addr,
            backend_addr = %self.config.backend_addr,
            "Proxy started"
        );

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.stop.stopped() => {
                    return self.stop_accepting().await;
                }
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // A connection racing the stop signal through the accept
                    // backlog is refused, not relayed.
                    if self.stop.is_stopped() {
                        drop(stream);
                        return self.stop_accepting().await;
                    }

                    let Some(token) = self.admission.try_admit() else {
                        self.stats
                            .connections_rejected
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(peer_addr = %peer_addr, "Connection rejected: at capacity");
                        continue;
                    };

                    let (close_tx, close_rx) = oneshot::channel();
                    if !self.registry.insert(peer_addr, close_tx).await {
                        // Shutdown won the race; the token drops here.
                        drop(stream);
                        continue;
                    }

                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    info!(peer_addr = %peer_addr, "Connection accepted");

                    let proxy = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            let reason = proxy.relay.run_pair(stream, close_rx).await;
                            // Both sockets are closed by now: release the
                            // token, then the registry entry.
                            drop(token);
                            proxy.registry.remove(&peer_addr).await;
                            proxy.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            proxy.stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                            debug!(reason = ?reason, "Pair finished");
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    if self.stop.is_stopped() {
                        return self.stop_accepting().await;
                    }
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid a tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Force-close every registered connection and exit the accept loop.
    async fn stop_accepting(&self) -> io::Result<()> {
        info!("Listener stopped accepting new connections");
        let closed = self.registry.close_all().await;
        if closed > 0 {
            info!(connections_closed = closed, "Force-closed active connections");
        }
        Ok(())
    }
}
