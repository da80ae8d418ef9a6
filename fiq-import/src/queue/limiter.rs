//! Admission control for active jobs

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of jobs in `validating` or `importing`
///
/// Admission never waits: the dispatcher asks for a permit and leaves the
/// job pending when none is free. The slot is returned when the permit is
/// dropped, so every exit path of a job (completion, failure, cancellation,
/// panic) frees it exactly once.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Held for as long as a job occupies an active slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Give the slot back
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Claim a slot if one is free
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently held
    pub fn active(&self) -> usize {
        self.max - self.available()
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
