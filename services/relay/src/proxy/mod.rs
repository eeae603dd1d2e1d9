//! Bounded TCP relay engine.
//!
//! This module provides:
//! - Non-blocking admission control over concurrent connection pairs
//! - The per-pair byte-pump state machine with a shared idle timer
//! - A registry of active client connections for forced closure
//! - The stop signal and shutdown coordinator
//!
//! ## Architecture
//!
//! ```text
//! Client -> Acceptor -> Admission -> Registry -> Pair -> Backend
//!                                       |
//!                          Shutdown coordinator (force close)
//! ```
//!
//! Each admitted pair runs as its own task with two byte-pump sub-tasks,
//! one per direction. The first pump to finish, the shared idle timer, or
//! a shutdown force-close ends the pair; both sockets are then closed and
//! the admission token returns to the pool.

mod admission;
mod error;
mod listener;
mod registry;
mod relay;
mod shutdown;

pub use admission::{Admission, AdmissionToken};
pub use error::RelayError;
pub use listener::{Proxy, ProxyConfig, ProxyStats, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};
pub use registry::Registry;
pub use relay::{CloseReason, IdleTimer, Relay, DEFAULT_DIAL_TIMEOUT, PUMP_BUFFER_SIZE};
pub use shutdown::{ShutdownCoordinator, StopSignal};
