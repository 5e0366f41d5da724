//! Concurrency gate for snapshot jobs
//!
//! A counting admission control in front of the renderer. Slots are handed
//! out first-come-first-served by a tokio [`Semaphore`] and are tied to the
//! lifetime of a [`GatePermit`], so a slot comes back on every exit path:
//! normal return, error, panic unwinding, or the holding future being dropped.

use crate::config::GateConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors raised while waiting for a gate slot
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// The gate was built with zero slots
    #[error("gate capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// No slot became free before the acquisition deadline
    #[error("timed out after {0:?} waiting for a free slot")]
    Timeout(Duration),

    /// The gate was closed by [`ConcurrencyGate::close`]
    #[error("gate is closed")]
    Closed,
}

/// Bounded-concurrency admission control
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Option<Duration>,
}

/// A held gate slot, returned to the gate when dropped
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Give the slot back now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` slots and no acquisition deadline
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        if capacity == 0 {
            return Err(GateError::InvalidCapacity(capacity));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout: None,
        })
    }

    /// Create a gate from the `[gate]` configuration section
    pub fn from_config(cfg: &GateConfig) -> Result<Self, GateError> {
        let gate = Self::new(cfg.capacity as usize)?;
        Ok(match cfg.acquire_timeout_secs {
            Some(secs) => gate.with_acquire_timeout(Duration::from_secs(secs)),
            None => gate,
        })
    }

    /// Fail acquisitions that wait longer than `timeout`
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stop admitting jobs
    ///
    /// Current and future waiters fail with [`GateError::Closed`]; permits
    /// already handed out stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait for a free slot
    ///
    /// Waiters are served in arrival order. Dropping the returned future
    /// before it completes abandons the wait without consuming a slot.
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match self.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| GateError::Timeout(timeout))?,
            None => acquire.await,
        }
        .map_err(|_| GateError::Closed)?;

        Ok(GatePermit { _permit: permit })
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Run `fut` while holding a slot
    pub async fn run_exclusive<F, T>(&self, fut: F) -> Result<T, GateError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(fut.await)
    }
}
