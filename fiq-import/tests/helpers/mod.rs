//! Test helpers for fiq-import integration tests
//!
//! - ScriptedImporter / ScriptedValidator: plugins whose behavior per file is
//!   scripted up front and gated by a semaphore the test controls
//! - wait helpers that poll the queue with a deadline

#![allow(dead_code)]

pub mod scripted_plugins;

pub use scripted_plugins::{ScriptedImporter, ScriptedValidator, Step};

use fiq_import::{FileDescriptor, ImportJob, ImportQueueManager, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn file(name: &str) -> FileDescriptor {
    FileDescriptor::new(format!("/virtual/{}", name), name, 1000)
}

pub fn queue_with(
    importer: &Arc<ScriptedImporter>,
    validator: &Arc<ScriptedValidator>,
    max_concurrent: usize,
) -> ImportQueueManager {
    ImportQueueManager::builder(importer.clone())
        .validator(validator.clone())
        .max_concurrent(max_concurrent)
        .build()
        .expect("queue builds inside a runtime")
}

/// Poll until `predicate` holds for the job, panicking after [`TEST_TIMEOUT`]
pub async fn wait_for_job<F>(queue: &ImportQueueManager, id: Uuid, predicate: F) -> ImportJob
where
    F: Fn(&ImportJob) -> bool,
{
    let poll = async {
        loop {
            if let Some(job) = queue.job(id) {
                if predicate(&job) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };

    tokio::time::timeout(TEST_TIMEOUT, poll)
        .await
        .unwrap_or_else(|_| panic!("job {} never reached the expected state: {:?}", id, queue.job(id)))
}

pub async fn wait_for_status(queue: &ImportQueueManager, id: Uuid, status: JobStatus) -> ImportJob {
    wait_for_job(queue, id, |job| job.status == status).await
}

pub async fn wait_idle(queue: &ImportQueueManager) {
    tokio::time::timeout(TEST_TIMEOUT, queue.wait_idle())
        .await
        .unwrap_or_else(|_| panic!("queue never drained: {:?}", queue));
}
