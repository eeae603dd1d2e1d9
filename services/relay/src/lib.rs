//! Transparent TCP forwarding proxy.
//!
//! Accepts client connections, dials a fixed backend for each one, and
//! relays bytes in both directions under a bounded admission policy, an
//! idle-timeout watchdog, and coordinated graceful shutdown.

pub mod config;
pub mod proxy;

pub use proxy::{
    Admission, AdmissionToken, CloseReason, Proxy, ProxyConfig, ProxyStats, Registry, RelayError,
    ShutdownCoordinator, StopSignal,
};
