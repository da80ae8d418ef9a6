//! Batch progress aggregation
//!
//! Policy for unfinished jobs in the mean: a job that ended in `error` or
//! `cancelled` contributes the progress it had reached when it stopped. It is
//! not reset to 0 and not rounded up to 100. A batch where one of two files
//! failed at 50% therefore reads 75%, not 50% or 100%.

use crate::models::{ImportJob, ImportProgress};
use chrono::{DateTime, Utc};
use fiq_common::events::JobStatus;
use std::time::Duration;

/// Derives an [`ImportProgress`] summary from a set of jobs
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Summarize jobs as of `now`
    ///
    /// ETA is only produced while some job is importing with progress > 0.
    /// Each such job is extrapolated linearly from its own elapsed time and
    /// percentage; the slowest one sets the estimate.
    pub fn summarize<'a, I>(jobs: I, now: DateTime<Utc>) -> ImportProgress
    where
        I: IntoIterator<Item = &'a ImportJob>,
    {
        let mut summary = ImportProgress::default();
        let mut progress_sum = 0.0;
        let mut eta: Option<Duration> = None;
        let mut current: Option<&ImportJob> = None;

        for job in jobs {
            summary.total_files += 1;
            progress_sum += job.effective_progress();

            match job.status {
                JobStatus::Pending => summary.pending_files += 1,
                JobStatus::Validating => summary.active_files += 1,
                JobStatus::Importing => {
                    summary.active_files += 1;
                    if let Some(remaining) = job_remaining(job, now) {
                        eta = Some(eta.map_or(remaining, |e| e.max(remaining)));
                    }
                    // First job wins ties, so the display is stable
                    if current.map_or(true, |c| job.progress > c.progress) {
                        current = Some(job);
                    }
                }
                JobStatus::Completed => summary.completed_files += 1,
                JobStatus::Error => summary.failed_files += 1,
                JobStatus::Cancelled => summary.cancelled_files += 1,
            }
        }

        if summary.total_files > 0 {
            summary.overall_progress =
                (progress_sum / summary.total_files as f64).clamp(0.0, 100.0);
        }

        summary.current_file = current.map(|job| job.display_name.clone());
        summary.estimated_time_remaining = eta;

        summary
    }
}

/// Remaining time for an importing job, once it has reported progress
fn job_remaining(job: &ImportJob, now: DateTime<Utc>) -> Option<Duration> {
    if job.progress <= 0.0 {
        return None;
    }
    let started = job.started_at?;
    let elapsed = fiq_common::time::elapsed_between(started, now);
    Some(extrapolate_remaining(elapsed, job.progress))
}

/// Remaining time if the rest proceeds at the rate observed so far
fn extrapolate_remaining(elapsed: Duration, percent_done: f64) -> Duration {
    if percent_done >= 100.0 {
        return Duration::ZERO;
    }
    if percent_done <= 0.0 {
        // Callers only extrapolate once something has progressed
        return Duration::ZERO;
    }

    let remaining_secs = elapsed.as_secs_f64() * (100.0 - percent_done) / percent_done;
    // Tiny percentages overflow Duration
    Duration::try_from_secs_f64(remaining_secs).unwrap_or(Duration::MAX)
}
