//! Cooperative cancellation tests

mod helpers;

use fiq_import::{JobStatus, QueueError};
use helpers::*;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_cancel_pending_is_immediate_and_runs_nothing() {
    let importer = ScriptedImporter::new();
    importer.script("busy.txt", vec![Step::Hold]);
    let validator = ScriptedValidator::accept_all();
    let queue = queue_with(&importer, &validator, 1);

    let ids = queue.enqueue([file("busy.txt"), file("queued.txt")]);
    assert_eq!(queue.job(ids[1]).unwrap().status, JobStatus::Pending);

    queue.cancel(ids[1]).unwrap();

    // Transitioned before cancel() returned
    let cancelled = queue.job(ids[1]).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.cancel_requested);
    assert!(cancelled.finished_at.is_some());
    assert!(cancelled.started_at.is_none());
    assert_eq!(queue.pending_count(), 0);

    importer.release(1);
    wait_idle(&queue).await;

    assert_eq!(importer.started(), vec!["busy.txt"]);
    assert_eq!(validator.seen(), vec!["busy.txt"]);
    assert_eq!(queue.job(ids[1]).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_importing_job_freezes_progress() {
    let importer = ScriptedImporter::new();
    importer.script("long.txt", vec![Step::Progress(30.0), Step::Hold, Step::Progress(80.0)]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("long.txt")]);
    wait_for_job(&queue, ids[0], |j| j.progress == 30.0).await;

    queue.cancel(ids[0]).unwrap();
    wait_idle(&queue).await;

    let job = queue.job(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 30.0);
    assert!(job.cancel_requested);
    assert!(job.finished_at.is_some());
    assert_eq!(job.error_message, None);
    assert_eq!(queue.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_during_validation() {
    let importer = ScriptedImporter::new();
    let validator = ScriptedValidator::holding(&["slow.txt"]);
    let queue = queue_with(&importer, &validator, 1);

    let ids = queue.enqueue([file("slow.txt")]);
    wait_for_job(&queue, ids[0], |_| validator.seen().len() == 1).await;

    queue.cancel(ids[0]).unwrap();
    wait_idle(&queue).await;

    assert_eq!(queue.job(ids[0]).unwrap().status, JobStatus::Cancelled);
    assert_eq!(importer.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_job_never_completes() {
    let importer = ScriptedImporter::new();
    importer.script("stubborn.txt", vec![Step::Progress(40.0), Step::HoldIgnoringCancel]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("stubborn.txt")]);
    wait_for_job(&queue, ids[0], |j| j.progress == 40.0).await;

    queue.cancel(ids[0]).unwrap();

    // cancel() does not wait for the importer
    let job = queue.job(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Importing);
    assert!(job.cancel_requested);

    // The importer ignores the token and reports success
    importer.release(1);
    wait_idle(&queue).await;

    let job = queue.job(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 40.0);
}

#[tokio::test]
async fn test_cancel_all() {
    let importer = ScriptedImporter::new();
    let names = ["a.txt", "b.txt", "c.txt", "d.txt"];
    for name in names {
        importer.script(name, vec![Step::Hold]);
    }
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 2);

    let ids = queue.enqueue(names.iter().map(|n| file(n)));
    wait_for_status(&queue, ids[0], JobStatus::Importing).await;
    wait_for_status(&queue, ids[1], JobStatus::Importing).await;

    assert_eq!(queue.cancel_all(), 4);

    // Pending jobs are already cancelled
    assert_eq!(queue.job(ids[2]).unwrap().status, JobStatus::Cancelled);
    assert_eq!(queue.job(ids[3]).unwrap().status, JobStatus::Cancelled);

    wait_idle(&queue).await;

    assert!(queue
        .snapshot()
        .iter()
        .all(|j| j.status == JobStatus::Cancelled));
    assert_eq!(importer.started(), vec!["a.txt", "b.txt"]);
    assert_eq!(queue.summary().cancelled_files, 4);

    // Nothing left to cancel
    assert_eq!(queue.cancel_all(), 0);
}

#[tokio::test]
async fn test_cancel_unknown_and_finished_jobs() {
    let importer = ScriptedImporter::new();
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let unknown = Uuid::new_v4();
    let err = queue.cancel(unknown).unwrap_err();
    assert!(matches!(err, QueueError::NotFound(id) if id == unknown));
    assert!(err.is_invalid_operation());

    let ids = queue.enqueue([file("a.txt")]);
    wait_idle(&queue).await;
    let finished = queue.job(ids[0]).unwrap();
    assert_eq!(finished.status, JobStatus::Completed);

    // No-op, repeatedly
    queue.cancel(ids[0]).unwrap();
    queue.cancel(ids[0]).unwrap();

    let job = queue.job(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.cancel_requested);
    assert_eq!(job.finished_at, finished.finished_at);
}

#[tokio::test]
async fn test_cancel_is_idempotent_while_running() {
    let importer = ScriptedImporter::new();
    importer.script("a.txt", vec![Step::Hold]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("a.txt")]);
    wait_for_status(&queue, ids[0], JobStatus::Importing).await;

    queue.cancel(ids[0]).unwrap();
    queue.cancel(ids[0]).unwrap();
    wait_idle(&queue).await;

    assert_eq!(queue.job(ids[0]).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_cancelled_slot_admits_next_job() {
    let importer = ScriptedImporter::new();
    importer.script("stuck.txt", vec![Step::Hold]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("stuck.txt"), file("next.txt")]);
    wait_for_status(&queue, ids[0], JobStatus::Importing).await;
    assert_eq!(queue.job(ids[1]).unwrap().status, JobStatus::Pending);

    queue.cancel(ids[0]).unwrap();
    wait_idle(&queue).await;

    assert_eq!(queue.job(ids[0]).unwrap().status, JobStatus::Cancelled);
    assert_eq!(queue.job(ids[1]).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_after_deadline() {
    let importer = ScriptedImporter::new();
    importer.script("endless.txt", vec![Step::Progress(5.0), Step::Hold]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("endless.txt")]);
    let deadline = queue
        .cancel_after(ids[0], Duration::from_millis(20))
        .unwrap();

    wait_idle(&queue).await;
    deadline.await.unwrap();

    let job = queue.job(ids[0]).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 5.0);
}

#[tokio::test]
async fn test_cancelled_job_can_be_retried() {
    let importer = ScriptedImporter::new();
    importer.script("again.txt", vec![Step::Hold]);
    let queue = queue_with(&importer, &ScriptedValidator::accept_all(), 1);

    let ids = queue.enqueue([file("again.txt")]);
    wait_for_status(&queue, ids[0], JobStatus::Importing).await;
    queue.cancel(ids[0]).unwrap();
    wait_idle(&queue).await;

    let retry_id = queue.retry(ids[0]).unwrap();
    wait_idle(&queue).await;

    assert_eq!(queue.job(ids[0]).unwrap().status, JobStatus::Cancelled);
    let retried = queue.job(retry_id).unwrap();
    assert_eq!(retried.status, JobStatus::Completed);
    assert_eq!(retried.attempt, 2);
    assert!(!retried.cancel_requested);
}
