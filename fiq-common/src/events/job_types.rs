//! Import job type definitions
//!
//! Supporting types shared between the queue and anything rendering it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one import job
///
/// `Pending → Validating → Importing → Completed`, with `Validating` and
/// `Importing` able to end in `Error` or `Cancelled`, and `Pending` able to
/// end in `Cancelled` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a concurrency slot
    Pending,
    /// Holding a slot, validator running
    Validating,
    /// Holding a slot, importer running
    Importing,
    /// Import finished successfully
    Completed,
    /// Validator rejected the file or importer failed
    Error,
    /// Cancelled before or during processing
    Cancelled,
}

impl JobStatus {
    /// Job occupies a concurrency slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Validating | Self::Importing)
    }

    /// No further automatic transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// A new attempt may be created from a job in this status
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Importing => "importing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phase produced a job's error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Validator declined the file
    ValidationRejected,
    /// Importer reported a failure
    ImportFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationRejected => f.write_str("validation_rejected"),
            Self::ImportFailed => f.write_str("import_failed"),
        }
    }
}
