//! tcpfwd echo server
//!
//! Standalone acknowledgement backend for exercising the relay by hand.
//! Accepts TCP connections, logs every payload received, and answers each
//! message with a fixed acknowledgement string. Not part of the relay's
//! contract.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Reply sent for every message received.
const ACK: &[u8] = b"message received\n";

#[tokio::main]
async fn main() -> Result<()> {
    let listen_addr =
        std::env::var("ECHO_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());
    let log_level = std::env::var("ECHO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(listen_addr = %listen_addr, "Echo server listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt signal, shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!(peer_addr = %peer_addr, "Connection accepted");
                    tokio::spawn(handle_connection(stream));
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }
}

/// Read messages until the peer closes, acknowledging each one.
async fn handle_connection(mut stream: TcpStream) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".to_string(),
    };

    let mut buf = vec![0u8; 2048];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                info!(peer_addr = %peer, "Connection closed by peer");
                return;
            }
            Ok(n) => {
                info!(
                    peer_addr = %peer,
                    payload = %String::from_utf8_lossy(&buf[..n]),
                    "Message received"
                );
                if let Err(e) = stream.write_all(ACK).await {
                    warn!(peer_addr = %peer, error = %e, "Failed to write acknowledgement");
                    return;
                }
            }
            Err(e) => {
                warn!(peer_addr = %peer, error = %e, "Read error");
                return;
            }
        }
    }
}
