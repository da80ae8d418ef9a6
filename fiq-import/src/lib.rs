//! fiq-import library interface
//!
//! A file import queue: jobs advance through validation and import with
//! bounded concurrency, per-job and batch progress, cooperative cancellation
//! and retry of failed attempts.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fiq_import::{FileDescriptor, ImportQueueManager};
//! use fiq_import::services::{ExtensionValidator, TranscriptImporter, TranscriptLibrary};
//!
//! let library = TranscriptLibrary::default();
//! let queue = ImportQueueManager::builder(Arc::new(TranscriptImporter::new(library.clone(), 64 * 1024)))
//!     .validator(Arc::new(ExtensionValidator::transcripts()))
//!     .max_concurrent(2)
//!     .build()?;
//!
//! queue.enqueue([FileDescriptor::from_path("talk.srt")]);
//! queue.wait_idle().await;
//! println!("{:?}", queue.summary());
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod progress;
pub mod queue;
pub mod services;
pub mod types;

pub use crate::error::{QueueError, QueueResult};
pub use crate::models::{FileDescriptor, ImportJob, ImportProgress};
pub use crate::progress::ProgressAggregator;
pub use crate::queue::{ConcurrencyLimiter, ImportQueueBuilder, ImportQueueManager};
pub use crate::types::{
    AcceptAll, Cancelled, ImportError, Importer, JobContext, ValidationError, Validator,
};
pub use fiq_common::events::{FailureKind, JobStatus};
