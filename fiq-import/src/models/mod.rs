//! Data models for the import queue

pub mod import_job;
pub mod import_progress;

pub use import_job::{FileDescriptor, ImportJob, StatusTransition, MAX_ACTIVE_PROGRESS};
pub use import_progress::ImportProgress;
