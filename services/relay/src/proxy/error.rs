//! Relay error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors from the relay engine.
///
/// Everything else (transfer failures, idle timeouts, accept errors) is
/// handled where it happens and surfaces only as log lines.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be bound. Fatal at startup.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The backend could not be dialed within the deadline.
    #[error("failed to dial backend {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}
