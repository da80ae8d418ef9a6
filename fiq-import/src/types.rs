//! Plugin contract for validators and importers
//!
//! The queue calls a [`Validator`] then an [`Importer`] for every admitted
//! job. Both receive a [`JobContext`] for progress reporting and cooperative
//! cancellation: the plugin calls [`JobContext::checkpoint`] between units of
//! work and returns as soon as it yields `Err(Cancelled)`.
//!
//! # Example
//! ```rust,ignore
//! struct LineCounter;
//!
//! #[async_trait::async_trait]
//! impl Importer for LineCounter {
//!     async fn import(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ImportError> {
//!         let text = tokio::fs::read_to_string(&job.source_path).await?;
//!         let total = text.lines().count().max(1);
//!         for (i, _line) in text.lines().enumerate() {
//!             ctx.checkpoint(i as f64 * 100.0 / total as f64)?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::models::ImportJob;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation observed at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancellation requested")]
pub struct Cancelled;

/// Validator verdict other than acceptance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// File declined; the reason becomes the job's error message
    #[error("{0}")]
    Rejected(String),

    #[error("validation cancelled")]
    Cancelled,
}

impl From<Cancelled> for ValidationError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Importer outcome other than completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// Import failed; the reason becomes the job's error message
    #[error("{0}")]
    Failed(String),

    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<Cancelled> for ImportError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

type ProgressReporter = Arc<dyn Fn(f64) + Send + Sync>;

/// Per-job handle given to plugins
///
/// Carries the job's cancellation token and a progress sink. Progress
/// reports are applied in the order they are made.
#[derive(Clone)]
pub struct JobContext {
    job_id: Uuid,
    token: CancellationToken,
    reporter: ProgressReporter,
}

impl JobContext {
    /// Build a context; the queue does this for every admitted job
    ///
    /// Public so plugins can be exercised on their own in tests.
    pub fn new(
        job_id: Uuid,
        token: CancellationToken,
        reporter: impl Fn(f64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            job_id,
            token,
            reporter: Arc::new(reporter),
        }
    }

    /// Context whose progress reports go nowhere
    pub fn detached(job_id: Uuid) -> Self {
        Self::new(job_id, CancellationToken::new(), |_| {})
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Report progress (0.0 - 100.0)
    pub fn report_progress(&self, progress: f64) {
        (self.reporter)(progress);
    }

    /// Report progress, then check for cancellation
    pub fn checkpoint(&self, progress: f64) -> Result<(), Cancelled> {
        self.report_progress(progress);
        self.check_cancelled()
    }

    /// Check for cancellation without reporting progress
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested, for use in `tokio::select!`
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Pass/fail gate run before import
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Validator name for logging
    fn name(&self) -> &'static str;

    async fn validate(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ValidationError>;
}

/// Performs the actual import of a validated file
#[async_trait::async_trait]
pub trait Importer: Send + Sync {
    /// Importer name for logging
    fn name(&self) -> &'static str;

    /// `Ok(())` means completed
    async fn import(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ImportError>;
}

/// Validator used when none is supplied: accepts every file
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait::async_trait]
impl Validator for AcceptAll {
    fn name(&self) -> &'static str {
        "accept-all"
    }

    async fn validate(&self, _job: &ImportJob, ctx: &JobContext) -> Result<(), ValidationError> {
        ctx.check_cancelled()?;
        Ok(())
    }
}
