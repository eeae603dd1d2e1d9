//! tcpfwd relay
//!
//! Transparent TCP forwarding proxy.
//!
//! This binary:
//! - Accepts TCP connections on the configured listen address
//! - Admits up to a fixed number of concurrent connection pairs
//! - Relays bytes verbatim between each client and a fixed backend
//! - Closes pairs that stay idle past the configured window
//! - Shuts down gracefully on SIGINT/SIGTERM, force-closing active pairs

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tcpfwd_relay::config::Config;
use tcpfwd_relay::proxy::{Proxy, ProxyConfig, Registry, ShutdownCoordinator, StopSignal};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to RELAY_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tcpfwd relay");
    info!(
        listen_addr = %config.listen_addr,
        backend_addr = %config.backend_addr,
        max_connections = config.max_connections,
        idle_timeout_ms = config.idle_timeout.as_millis() as u64,
        dial_timeout_ms = config.dial_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    // Create shared state
    let registry = Arc::new(Registry::new());
    let stop = StopSignal::new();

    let mut proxy_config = ProxyConfig::new(config.listen_addr, config.backend_addr);
    proxy_config.max_connections = config.max_connections;
    proxy_config.idle_timeout = config.idle_timeout;
    proxy_config.dial_timeout = config.dial_timeout;

    let proxy = Arc::new(Proxy::bind(proxy_config, Arc::clone(&registry), stop.clone()).await?);

    let coordinator = ShutdownCoordinator::new(stop, registry);
    let coordinator_handle = tokio::spawn(coordinator.run());

    // Blocks until the stop signal latches
    proxy.run().await?;
    coordinator_handle.await?;

    Ok(())
}
