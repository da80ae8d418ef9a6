//! Error types for fiq-import
//!
//! Only operations the caller invokes on the queue return these. Failures of
//! an individual job never surface here; they are recorded on the job.

use fiq_common::events::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// Queue operation error
#[derive(Debug, Error)]
pub enum QueueError {
    /// No job with this id is tracked (never enqueued, or cleared)
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Retry requested for a job that is not `error` or `cancelled`
    #[error("Job {job_id} is {status} and cannot be retried")]
    NotRetryable { job_id: Uuid, status: JobStatus },

    /// The queue was built outside a tokio runtime
    #[error("No tokio runtime available: {0}")]
    Runtime(String),

    /// fiq-common error
    #[error("Common error: {0}")]
    Common(#[from] fiq_common::Error),
}

impl QueueError {
    /// Rejected caller request that left every job untouched
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotRetryable { .. })
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
