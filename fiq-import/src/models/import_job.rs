//! Import job state machine
//!
//! One `ImportJob` tracks one file's attempt through the pipeline:
//! PENDING → VALIDATING → IMPORTING → COMPLETED, with ERROR and CANCELLED as
//! the other terminal states. A terminal job is never modified again; retry
//! produces a fresh record via [`ImportJob::retry_attempt`].

use chrono::{DateTime, Utc};
use fiq_common::events::{FailureKind, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Highest progress an unfinished job can show
///
/// 100 is reserved for `completed`, so reports at or above it are held here.
pub const MAX_ACTIVE_PROGRESS: f64 = 99.9;

/// File handed to the queue by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            size_bytes,
        }
    }

    /// Build a descriptor from a path on disk
    ///
    /// Display name is the file name; size comes from filesystem metadata and
    /// is 0 when the file cannot be read (the validator reports why).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Self {
            path: path.to_path_buf(),
            display_name,
            size_bytes,
        }
    }
}

/// Status change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub job_id: Uuid,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One file's tracked import attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    /// Unique job identifier, never reused
    pub id: Uuid,

    pub source_path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,

    pub status: JobStatus,

    /// Percentage complete (0.0 - 100.0)
    pub progress: f64,

    /// Reason for failure; set iff `status == Error`
    pub error_message: Option<String>,

    /// Phase that failed; set iff `status == Error`
    pub error_kind: Option<FailureKind>,

    /// FIFO admission key
    pub enqueued_at: DateTime<Utc>,

    /// Set on entering `Validating`
    pub started_at: Option<DateTime<Utc>>,

    /// Set on entering any terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Cancellation was requested; the running plugin stops at its next checkpoint
    pub cancel_requested: bool,

    /// 1 for the first attempt, +1 per retry
    pub attempt: u32,

    /// The record this attempt retries
    pub retry_of: Option<Uuid>,
}

impl PartialEq for ImportJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImportJob {}

impl ImportJob {
    /// Create a pending job for a descriptor
    pub(crate) fn new(descriptor: FileDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: descriptor.path,
            display_name: descriptor.display_name,
            size_bytes: descriptor.size_bytes,
            status: JobStatus::Pending,
            progress: 0.0,
            error_message: None,
            error_kind: None,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            cancel_requested: false,
            attempt: 1,
            retry_of: None,
        }
    }

    /// Fresh pending record for the same source; `self` is left untouched
    pub(crate) fn retry_attempt(&self, now: DateTime<Utc>) -> Self {
        Self {
            attempt: self.attempt + 1,
            retry_of: Some(self.id),
            ..Self::new(self.descriptor(), now)
        }
    }

    /// Source metadata this job was created from
    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor {
            path: self.source_path.clone(),
            display_name: self.display_name.clone(),
            size_bytes: self.size_bytes,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress as counted by batch aggregation
    ///
    /// Completed jobs count 100; failed and cancelled jobs keep their frozen
    /// partial progress.
    pub fn effective_progress(&self) -> f64 {
        match self.status {
            JobStatus::Completed => 100.0,
            _ => self.progress,
        }
    }

    /// Time spent since admission, up to `finished_at` for terminal jobs
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now);
        Some(fiq_common::time::elapsed_between(started, end))
    }

    fn transition_to(&mut self, new_status: JobStatus, now: DateTime<Utc>) -> StatusTransition {
        let transition = StatusTransition {
            job_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;

        if new_status.is_terminal() {
            self.finished_at = Some(now);
        }

        transition
    }

    /// pending → validating
    pub(crate) fn admit(&mut self, now: DateTime<Utc>) -> StatusTransition {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.started_at = Some(now);
        self.transition_to(JobStatus::Validating, now)
    }

    /// validating → importing
    pub(crate) fn begin_import(&mut self, now: DateTime<Utc>) -> StatusTransition {
        debug_assert_eq!(self.status, JobStatus::Validating);
        self.transition_to(JobStatus::Importing, now)
    }

    /// importing → completed
    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> StatusTransition {
        self.progress = 100.0;
        self.transition_to(JobStatus::Completed, now)
    }

    /// validating/importing → error; progress stays frozen
    pub(crate) fn fail(
        &mut self,
        kind: FailureKind,
        message: String,
        now: DateTime<Utc>,
    ) -> StatusTransition {
        self.error_kind = Some(kind);
        self.error_message = Some(message);
        self.transition_to(JobStatus::Error, now)
    }

    /// any non-terminal → cancelled; progress stays frozen
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> StatusTransition {
        self.cancel_requested = true;
        self.transition_to(JobStatus::Cancelled, now)
    }

    /// Apply a progress report
    ///
    /// Ignored unless the job is active. Values are clamped to
    /// `[0, MAX_ACTIVE_PROGRESS]` and never move progress backwards.
    /// Returns the new value when progress advanced.
    pub(crate) fn record_progress(&mut self, reported: f64) -> Option<f64> {
        if !self.is_active() || reported.is_nan() {
            return None;
        }

        let clamped = reported.clamp(0.0, MAX_ACTIVE_PROGRESS);
        if clamped > self.progress {
            self.progress = clamped;
            Some(clamped)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ImportJob {
        ImportJob::new(
            FileDescriptor::new("/transcripts/talk.srt", "talk.srt", 2048),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.attempt, 1);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_full_successful_lifecycle() {
        let mut job = job();
        let now = Utc::now();

        let t = job.admit(now);
        assert_eq!((t.old_status, t.new_status), (JobStatus::Pending, JobStatus::Validating));
        assert_eq!(job.started_at, Some(now));

        job.begin_import(now);
        assert_eq!(job.record_progress(40.0), Some(40.0));

        let t = job.complete(now);
        assert_eq!(t.new_status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.finished_at, Some(now));
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = job();
        job.admit(Utc::now());
        job.begin_import(Utc::now());

        assert_eq!(job.record_progress(30.0), Some(30.0));
        assert_eq!(job.record_progress(20.0), None);
        assert_eq!(job.progress, 30.0);

        assert_eq!(job.record_progress(-5.0), None);
        assert_eq!(job.record_progress(f64::NAN), None);

        // 100 is reserved for completion
        assert_eq!(job.record_progress(100.0), Some(MAX_ACTIVE_PROGRESS));
        assert!(job.progress < 100.0);
    }

    #[test]
    fn test_progress_ignored_when_not_active() {
        let mut job = job();
        assert_eq!(job.record_progress(10.0), None);

        job.cancel(Utc::now());
        assert_eq!(job.record_progress(10.0), None);
        assert_eq!(job.progress, 0.0);
    }

    #[test]
    fn test_failure_freezes_progress() {
        let mut job = job();
        job.admit(Utc::now());
        job.begin_import(Utc::now());
        job.record_progress(50.0);

        job.fail(FailureKind::ImportFailed, "disk error".into(), Utc::now());

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 50.0);
        assert_eq!(job.effective_progress(), 50.0);
        assert_eq!(job.error_message.as_deref(), Some("disk error"));
        assert_eq!(job.error_kind, Some(FailureKind::ImportFailed));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_retry_attempt_is_a_new_record() {
        let mut original = job();
        original.admit(Utc::now());
        original.fail(FailureKind::ValidationRejected, "bad".into(), Utc::now());
        let before = original.clone();

        let retry = original.retry_attempt(Utc::now());

        assert_ne!(retry.id, original.id);
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.retry_of, Some(original.id));
        assert_eq!(retry.source_path, original.source_path);
        assert_eq!(retry.display_name, original.display_name);
        assert_eq!(retry.size_bytes, original.size_bytes);
        assert!(retry.error_message.is_none());

        // Original untouched
        assert_eq!(original.status, before.status);
        assert_eq!(original.error_message, before.error_message);
        assert_eq!(original.finished_at, before.finished_at);
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = job();
        let mut b = a.clone();
        b.progress = 42.0;
        assert_eq!(a, b);
        assert_ne!(a, job());
    }

    #[test]
    fn test_descriptor_from_missing_path() {
        let descriptor = FileDescriptor::from_path("/definitely/not/here/notes.txt");
        assert_eq!(descriptor.display_name, "notes.txt");
        assert_eq!(descriptor.size_bytes, 0);
    }

    #[test]
    fn test_elapsed_stops_at_finish() {
        let mut job = job();
        let start = Utc::now();
        job.admit(start);
        let end = start + chrono::Duration::seconds(5);
        job.cancel(end);

        let later = end + chrono::Duration::seconds(60);
        assert_eq!(job.elapsed(later), Some(Duration::from_secs(5)));
    }
}
