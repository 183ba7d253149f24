//! Concurrency limiting for file downloads
//!
//! The ConcurrencyLimiter caps how many downloads run at once across a whole
//! run. Slots are handed out as [`LimiterPermit`] guards that give the slot
//! back when dropped, so early returns and errors can never leak capacity.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Counting admission gate shared by every download of a run
///
/// # Implementation
///
/// The tokio semaphore is the only source of truth: the in-flight count is
/// derived from its available permits, so the instrumentation can never drift
/// from the real admission state. Waiters are served in arrival order.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    /// Highest in-flight count observed since creation
    peak: Arc<AtomicUsize>,
}

/// One held slot; dropping it releases the slot
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots (clamped to at least 1)
    ///
    /// # Examples
    ///
    /// ```
    /// use deploy_mirror::limiter::ConcurrencyLimiter;
    ///
    /// let limiter = ConcurrencyLimiter::new(2);
    /// assert_eq!(limiter.capacity(), 2);
    /// assert_eq!(limiter.in_flight(), 0);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot, giving up if `cancel` fires first
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LimiterPermit> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| Error::Cancelled)?
            }
        };
        self.peak.fetch_max(self.in_flight(), Ordering::SeqCst);
        Ok(LimiterPermit { _permit: permit })
    }

    /// Configured number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Highest number of slots ever held at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
