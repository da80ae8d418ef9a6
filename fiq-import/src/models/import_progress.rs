//! Batch-level progress summary

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read-only summary of the whole queue, produced by
/// [`ProgressAggregator`](crate::progress::ProgressAggregator)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    /// Jobs currently tracked (all statuses)
    pub total_files: usize,

    /// Jobs in `completed`
    pub completed_files: usize,

    /// Jobs in `error`
    pub failed_files: usize,

    /// Jobs in `cancelled`
    pub cancelled_files: usize,

    /// Jobs in `validating` or `importing`
    pub active_files: usize,

    /// Jobs in `pending`
    pub pending_files: usize,

    /// Mean effective progress (0.0 - 100.0)
    pub overall_progress: f64,

    /// Linear extrapolation of the remaining batch time, None if unknown
    pub estimated_time_remaining: Option<Duration>,

    /// Display name of the furthest-along importing job
    pub current_file: Option<String>,
}

impl ImportProgress {
    /// Nothing left to run
    pub fn is_finished(&self) -> bool {
        self.active_files == 0 && self.pending_files == 0
    }
}
