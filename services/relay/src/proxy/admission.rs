//! Admission control for concurrent connection pairs.
//!
//! A fixed pool of tokens bounds how many pairs may be in flight at once.
//! Admission is non-blocking: at capacity the caller is refused
//! immediately, never queued.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Capacity token held for the lifetime of one connection pair.
///
/// Dropping the token returns it to the pool. The token is moved into the
/// pair's handler task, so release happens exactly once on every exit
/// path, including dial failure.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

/// Bounded admission gate for connection pairs.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl Admission {
    /// Create a gate with `limit` tokens.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Take a token without waiting.
    ///
    /// Returns `None` when every token is outstanding.
    pub fn try_admit(&self) -> Option<AdmissionToken> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionToken { _permit: permit })
    }

    /// Number of tokens currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured capacity.
    pub fn limit(&self) -> usize {
        self.limit
    }
}
