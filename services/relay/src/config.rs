//! Relay configuration.
//!
//! All options are environment-driven with defaults suitable for running
//! against a local backend.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::proxy::{DEFAULT_DIAL_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};

/// Relay configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the acceptor binds and listens on.
    pub listen_addr: SocketAddr,

    /// Fixed backend address dialed for every accepted client.
    pub backend_addr: SocketAddr,

    /// Maximum number of concurrently relayed connection pairs.
    pub max_connections: usize,

    /// Inactivity window after which a pair is forcibly closed.
    pub idle_timeout: Duration,

    /// Deadline for dialing the backend.
    pub dial_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("RELAY_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("RELAY_LISTEN_ADDR must be a socket address (host:port).")?;

        let backend_addr = std::env::var("RELAY_BACKEND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9090".to_string())
            .parse()
            .context("RELAY_BACKEND_ADDR must be a socket address (host:port).")?;

        let max_connections: usize = std::env::var("RELAY_MAX_CONNECTIONS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("RELAY_MAX_CONNECTIONS must be an integer.")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
            .max(1);

        let idle_timeout_ms: u64 = std::env::var("RELAY_IDLE_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("RELAY_IDLE_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_IDLE_TIMEOUT.as_millis() as u64);
        let idle_timeout = Duration::from_millis(idle_timeout_ms.max(1));

        let dial_timeout_ms: u64 = std::env::var("RELAY_DIAL_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("RELAY_DIAL_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_DIAL_TIMEOUT.as_millis() as u64);
        let dial_timeout = Duration::from_millis(dial_timeout_ms.max(1));

        let log_level = std::env::var("RELAY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            backend_addr,
            max_connections,
            idle_timeout,
            dial_timeout,
            log_level,
        })
    }
}
