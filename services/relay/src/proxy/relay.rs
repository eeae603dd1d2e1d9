//! The connection pair: backend dial, two byte pumps, and the termination
//! race between pump completion, the idle watchdog, and forced closure.
//!
//! A pair moves through dialing, relaying, and draining. While relaying,
//! one pump task copies bytes per direction; every successful transfer in
//! either direction pushes the shared idle deadline out by a full window.
//! Whichever of the three terminators fires first (a pump finishing, the
//! idle timer expiring, or the shutdown force-close), both pumps are
//! aborted, which drops the stream halves and closes both sockets.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use super::error::RelayError;
use super::listener::ProxyStats;

/// Default deadline for dialing the backend.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Read buffer size for each pump direction.
pub const PUMP_BUFFER_SIZE: usize = 10 * 1024;

/// One pump direction within a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    /// The side whose socket this pump reads from.
    fn source(self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client",
            Direction::BackendToClient => "backend",
        }
    }
}

/// Why a pair terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client leg closed or failed first.
    ClientClosed,
    /// The backend leg closed or failed first.
    BackendClosed,
    /// No data moved in either direction for the idle window.
    IdleTimeout,
    /// Shutdown force-closed the pair.
    Forced,
    /// The backend could not be dialed.
    DialFailed,
}

/// Shared inactivity watchdog for one pair.
///
/// Both pumps push the same deadline; the watchdog fires only after a
/// full window passes with no transfer in either direction.
#[derive(Debug)]
pub struct IdleTimer {
    window: Duration,
    epoch: Instant,
    deadline_us: AtomicU64,
}

impl IdleTimer {
    /// Create a timer whose first deadline is one window from now.
    pub fn new(window: Duration) -> Self {
        let timer = Self {
            window,
            epoch: Instant::now(),
            deadline_us: AtomicU64::new(0),
        };
        timer.touch();
        timer
    }

    /// Push the deadline a full window into the future.
    pub fn touch(&self) {
        let deadline = self.epoch.elapsed() + self.window;
        self.deadline_us
            .store(deadline.as_micros() as u64, Ordering::Relaxed);
    }

    fn deadline(&self) -> Instant {
        self.epoch + Duration::from_micros(self.deadline_us.load(Ordering::Relaxed))
    }

    /// Resolves once a full window elapses with no intervening `touch`.
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            if Instant::now() >= deadline {
                return;
            }
            sleep_until(deadline).await;
        }
    }
}

/// Terminal report from one pump.
#[derive(Debug)]
struct PumpReport {
    direction: Direction,
    error: Option<io::Error>,
}

/// Copy bytes from `source` to `sink` until EOF or error, touching the
/// shared idle timer on every successful read.
async fn pump(
    mut source: OwnedReadHalf,
    mut sink: OwnedWriteHalf,
    direction: Direction,
    timer: Arc<IdleTimer>,
    stats: Arc<ProxyStats>,
    done: mpsc::Sender<PumpReport>,
) {
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    let error = loop {
        match source.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                timer.touch();
                if let Err(e) = sink.write_all(&buf[..n]).await {
                    break Some(e);
                }
                let counter = match direction {
                    Direction::ClientToBackend => &stats.bytes_to_backend,
                    Direction::BackendToClient => &stats.bytes_from_backend,
                };
                counter.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(e) => break Some(e),
        }
    };
    // The pair may already be tearing down; a dropped receiver is fine.
    let _ = done.send(PumpReport { direction, error }).await;
}

/// Dials the backend and drives one client/backend pair to completion.
#[derive(Debug)]
pub struct Relay {
    backend_addr: SocketAddr,
    dial_timeout: Duration,
    idle_timeout: Duration,
    stats: Arc<ProxyStats>,
}

impl Relay {
    /// Create a relay for a fixed backend address.
    pub fn new(
        backend_addr: SocketAddr,
        dial_timeout: Duration,
        idle_timeout: Duration,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            backend_addr,
            dial_timeout,
            idle_timeout,
            stats,
        }
    }

    /// Dial the backend within the configured deadline.
    async fn dial(&self) -> Result<TcpStream, RelayError> {
        match timeout(self.dial_timeout, TcpStream::connect(self.backend_addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(RelayError::Dial {
                addr: self.backend_addr,
                source,
            }),
            Err(_) => Err(RelayError::Dial {
                addr: self.backend_addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timeout"),
            }),
        }
    }

    /// Run one pair to completion, returning why it closed.
    ///
    /// The client stream and both halves of the backend stream are closed
    /// by the time this returns. `force_close` is the registry handle the
    /// shutdown path fires; its sender stays alive in the registry for as
    /// long as this pair runs, so any resolution means forced closure.
    pub async fn run_pair(
        &self,
        client: TcpStream,
        mut force_close: oneshot::Receiver<()>,
    ) -> CloseReason {
        let backend = match self.dial().await {
            Ok(stream) => stream,
            Err(e) => {
                self.stats.dial_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Dropping client, backend unreachable");
                return CloseReason::DialFailed;
            }
        };
        debug!(backend_addr = %self.backend_addr, "Backend connected");

        let timer = Arc::new(IdleTimer::new(self.idle_timeout));
        let (done_tx, mut done_rx) = mpsc::channel::<PumpReport>(2);

        let (client_read, client_write) = client.into_split();
        let (backend_read, backend_write) = backend.into_split();

        let client_pump = tokio::spawn(pump(
            client_read,
            backend_write,
            Direction::ClientToBackend,
            Arc::clone(&timer),
            Arc::clone(&self.stats),
            done_tx.clone(),
        ));
        let backend_pump = tokio::spawn(pump(
            backend_read,
            client_write,
            Direction::BackendToClient,
            Arc::clone(&timer),
            Arc::clone(&self.stats),
            done_tx,
        ));

        let reason = tokio::select! {
            report = done_rx.recv() => match report {
                Some(report) => {
                    match &report.error {
                        None => info!(
                            closed_by = report.direction.source(),
                            "Connection closed, draining pair"
                        ),
                        Some(e) => info!(
                            closed_by = report.direction.source(),
                            error = %e,
                            "Transfer failed, draining pair"
                        ),
                    }
                    match report.direction {
                        Direction::ClientToBackend => CloseReason::ClientClosed,
                        Direction::BackendToClient => CloseReason::BackendClosed,
                    }
                }
                // Unreachable while the pumps hold the sender, but a closed
                // channel can only mean the pair is done.
                None => CloseReason::Forced,
            },
            _ = timer.expired() => {
                self.stats.idle_timeouts.fetch_add(1, Ordering::Relaxed);
                info!(
                    idle_ms = self.idle_timeout.as_millis() as u64,
                    "Idle timeout, closing both legs"
                );
                CloseReason::IdleTimeout
            }
            _ = &mut force_close => {
                debug!("Pair force-closed by shutdown");
                CloseReason::Forced
            }
        };

        // Aborting the pumps drops the stream halves, closing whichever
        // sockets are still open. Wait for both so the sockets are really
        // closed before the registry entry and admission token release.
        client_pump.abort();
        backend_pump.abort();
        let _ = client_pump.await;
        let _ = backend_pump.await;

        reason
    }
}
