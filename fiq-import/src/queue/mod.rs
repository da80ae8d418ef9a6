//! Import queue manager
//!
//! Owns every job record, admits pending jobs in FIFO order while the
//! [`ConcurrencyLimiter`] has free slots, and runs each admitted job on the
//! tokio runtime it was built on.
//!
//! All job state lives behind one mutex that is never held across an
//! `.await`, so `snapshot()` and `summary()` never wait on plugin I/O. Events
//! are emitted while the lock is held, which keeps their order identical to
//! the order of the transitions they describe.

mod limiter;
mod runner;

pub use limiter::{AdmissionPermit, ConcurrencyLimiter};

use crate::config::DEFAULT_MAX_CONCURRENT;
use crate::error::{QueueError, QueueResult};
use crate::models::{FileDescriptor, ImportJob, ImportProgress, StatusTransition};
use crate::progress::ProgressAggregator;
use crate::types::{AcceptAll, Importer, Validator};
use fiq_common::events::{EventBus, FailureKind, QueueEvent};
use fiq_common::time;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a running job ended, as seen by the runner
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Completed,
    Failed { kind: FailureKind, message: String },
    Cancelled,
}

/// Bookkeeping for a job holding a slot
struct ActiveJob {
    token: CancellationToken,
    _permit: AdmissionPermit,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, ImportJob>,
    /// Enqueue order of every tracked job
    order: Vec<Uuid>,
    /// Pending jobs awaiting admission, FIFO
    pending: VecDeque<Uuid>,
    active: HashMap<Uuid, ActiveJob>,
    /// Jobs that already have a retry attempt
    retried: HashSet<Uuid>,
}

impl QueueState {
    fn outstanding(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    fn ordered_jobs(&self) -> impl Iterator<Item = &ImportJob> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    fn push_pending(&mut self, job: ImportJob) -> Uuid {
        let id = job.id;
        self.order.push(id);
        self.pending.push_back(id);
        self.jobs.insert(id, job);
        id
    }
}

struct Shared {
    state: Mutex<QueueState>,
    limiter: ConcurrencyLimiter,
    validator: Arc<dyn Validator>,
    importer: Arc<dyn Importer>,
    event_bus: EventBus,
    runtime: Handle,
    /// Pending plus active job count, for `wait_idle`
    idle_tx: watch::Sender<usize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave a job half-updated:
        // every mutation is a single assignment sequence without awaits.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_transition(&self, transition: StatusTransition, error_message: Option<String>) {
        self.event_bus.emit_lossy(QueueEvent::JobStatusChanged {
            job_id: transition.job_id,
            old_status: transition.old_status,
            new_status: transition.new_status,
            error_message,
            timestamp: transition.transitioned_at,
        });
    }

    fn emit_enqueued(&self, job: &ImportJob) {
        self.event_bus.emit_lossy(QueueEvent::JobEnqueued {
            job_id: job.id,
            display_name: job.display_name.clone(),
            source_path: job.source_path.display().to_string(),
            size_bytes: job.size_bytes,
            timestamp: job.enqueued_at,
        });
    }

    fn publish_outstanding(&self, state: &QueueState) {
        self.idle_tx.send_replace(state.outstanding());
    }

    /// Admit pending jobs in FIFO order while slots are free
    fn dispatch(self: &Arc<Self>, state: &mut QueueState) {
        while let Some(&id) = state.pending.front() {
            let Some(permit) = self.limiter.try_admit() else {
                break;
            };
            state.pending.pop_front();

            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };

            let transition = job.admit(time::now());
            let snapshot = job.clone();
            self.emit_transition(transition, None);

            info!(
                job_id = %id,
                file = %snapshot.display_name,
                attempt = snapshot.attempt,
                active = self.limiter.active(),
                "Job admitted"
            );

            let token = CancellationToken::new();
            state.active.insert(
                id,
                ActiveJob {
                    token: token.clone(),
                    _permit: permit,
                },
            );

            self.runtime
                .spawn(runner::run_job(Arc::clone(self), snapshot, token));
        }
    }

    /// Apply a progress report from a running plugin
    fn apply_progress(&self, id: Uuid, reported: f64) {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };

        if let Some(progress) = job.record_progress(reported) {
            self.event_bus.emit_lossy(QueueEvent::JobProgress {
                job_id: id,
                progress,
                timestamp: time::now(),
            });
        }
    }

    /// validating → importing, unless cancellation arrived first
    fn enter_importing(&self, id: Uuid) -> Option<ImportJob> {
        let mut state = self.lock();
        let cancelled = state
            .active
            .get(&id)
            .map_or(true, |active| active.token.is_cancelled());
        if cancelled {
            return None;
        }

        let job = state.jobs.get_mut(&id)?;
        let transition = job.begin_import(time::now());
        let snapshot = job.clone();
        self.emit_transition(transition, None);

        debug!(job_id = %id, file = %snapshot.display_name, "Validation passed, importing");
        Some(snapshot)
    }

    /// Move a running job to its terminal state and free its slot
    fn finish(self: &Arc<Self>, id: Uuid, outcome: Outcome) {
        let mut state = self.lock();

        // Dropping the entry releases the admission permit
        drop(state.active.remove(&id));

        if let Some(job) = state.jobs.get_mut(&id) {
            let now = time::now();
            // A job whose cancellation was requested never completes
            let outcome = match outcome {
                Outcome::Completed if job.cancel_requested => Outcome::Cancelled,
                other => other,
            };

            match outcome {
                Outcome::Completed => {
                    let transition = job.complete(now);
                    info!(
                        job_id = %id,
                        file = %job.display_name,
                        elapsed_ms = job.elapsed(now).map_or(0, |d| d.as_millis() as u64),
                        "Job completed"
                    );
                    self.emit_transition(transition, None);
                }
                Outcome::Failed { kind, message } => {
                    warn!(
                        job_id = %id,
                        file = %job.display_name,
                        kind = %kind,
                        progress = job.progress,
                        error = %message,
                        "Job failed"
                    );
                    let transition = job.fail(kind, message.clone(), now);
                    self.emit_transition(transition, Some(message));
                }
                Outcome::Cancelled => {
                    let transition = job.cancel(now);
                    info!(
                        job_id = %id,
                        file = %job.display_name,
                        progress = job.progress,
                        "Job cancelled"
                    );
                    self.emit_transition(transition, None);
                }
            }
        }

        self.dispatch(&mut state);
        self.publish_outstanding(&state);
    }
}

/// Builder for [`ImportQueueManager`]
pub struct ImportQueueBuilder {
    importer: Arc<dyn Importer>,
    validator: Option<Arc<dyn Validator>>,
    max_concurrent: usize,
    event_bus: Option<EventBus>,
}

impl ImportQueueBuilder {
    /// Maximum number of jobs validating or importing at once
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Validator run before import (default: [`AcceptAll`])
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Event bus to emit on (default: a fresh bus)
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Build the manager on the current tokio runtime
    ///
    /// # Errors
    /// `Common(Config)` when `max_concurrent` is 0, `Runtime` when called
    /// outside a tokio runtime.
    pub fn build(self) -> QueueResult<ImportQueueManager> {
        if self.max_concurrent == 0 {
            return Err(fiq_common::Error::Config(
                "max_concurrent must be at least 1".to_string(),
            )
            .into());
        }

        let runtime = Handle::try_current().map_err(|e| QueueError::Runtime(e.to_string()))?;
        let (idle_tx, _) = watch::channel(0);

        let validator = self.validator.unwrap_or_else(|| Arc::new(AcceptAll));
        info!(
            max_concurrent = self.max_concurrent,
            validator = validator.name(),
            importer = self.importer.name(),
            "Import queue created"
        );

        Ok(ImportQueueManager {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                limiter: ConcurrencyLimiter::new(self.max_concurrent),
                validator,
                importer: self.importer,
                event_bus: self.event_bus.unwrap_or_default(),
                runtime,
                idle_tx,
            }),
        })
    }
}

/// Bounded-concurrency file import queue
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct ImportQueueManager {
    shared: Arc<Shared>,
}

impl ImportQueueManager {
    pub fn builder(importer: Arc<dyn Importer>) -> ImportQueueBuilder {
        ImportQueueBuilder {
            importer,
            validator: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            event_bus: None,
        }
    }

    /// Create one pending job per descriptor
    ///
    /// Returns the new job ids in input order. Admission happens right away
    /// for as many jobs as there are free slots; nothing here waits.
    pub fn enqueue(&self, descriptors: impl IntoIterator<Item = FileDescriptor>) -> Vec<Uuid> {
        let mut state = self.shared.lock();
        let now = time::now();

        let ids: Vec<Uuid> = descriptors
            .into_iter()
            .map(|descriptor| {
                let job = ImportJob::new(descriptor, now);
                self.shared.emit_enqueued(&job);
                debug!(job_id = %job.id, file = %job.display_name, size_bytes = job.size_bytes, "Job enqueued");
                state.push_pending(job)
            })
            .collect();

        info!(count = ids.len(), pending = state.pending.len(), "Files enqueued");

        self.shared.dispatch(&mut state);
        self.shared.publish_outstanding(&state);
        ids
    }

    /// Request cancellation of a job
    ///
    /// A pending job is cancelled before this returns. An active job is
    /// signalled and ends `cancelled` once its plugin reaches a checkpoint.
    /// Cancelling a terminal job does nothing.
    pub fn cancel(&self, id: Uuid) -> QueueResult<()> {
        let mut state = self.shared.lock();
        self.cancel_locked(&mut state, id)?;
        self.shared.publish_outstanding(&state);
        Ok(())
    }

    fn cancel_locked(&self, state: &mut QueueState, id: Uuid) -> QueueResult<()> {
        let job = state.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;

        if job.is_terminal() {
            debug!(job_id = %id, status = %job.status, "Cancel ignored, job already finished");
            return Ok(());
        }

        if job.is_active() {
            job.cancel_requested = true;
            if let Some(active) = state.active.get(&id) {
                active.token.cancel();
            }
            info!(job_id = %id, file = %job.display_name, status = %job.status, "Cancellation requested");
            return Ok(());
        }

        let transition = job.cancel(time::now());
        info!(job_id = %id, file = %job.display_name, "Pending job cancelled");
        self.shared.emit_transition(transition, None);
        state.pending.retain(|pending_id| *pending_id != id);
        Ok(())
    }

    /// Cancel every non-terminal job, returning how many were signalled
    pub fn cancel_all(&self) -> usize {
        let mut state = self.shared.lock();
        let targets: Vec<Uuid> = state
            .ordered_jobs()
            .filter(|job| !job.is_terminal())
            .map(|job| job.id)
            .collect();

        for id in &targets {
            // Ids come from the map itself
            let _ = self.cancel_locked(&mut state, *id);
        }

        info!(count = targets.len(), "Cancelled all unfinished jobs");
        self.shared.publish_outstanding(&state);
        targets.len()
    }

    /// Create a new attempt for an `error` or `cancelled` job
    ///
    /// The new job goes to the back of the pending order; the original
    /// record is left as it was.
    pub fn retry(&self, id: Uuid) -> QueueResult<Uuid> {
        let mut state = self.shared.lock();
        let new_id = self.retry_locked(&mut state, id)?;
        self.shared.dispatch(&mut state);
        self.shared.publish_outstanding(&state);
        Ok(new_id)
    }

    fn retry_locked(&self, state: &mut QueueState, id: Uuid) -> QueueResult<Uuid> {
        let original = state.jobs.get(&id).ok_or(QueueError::NotFound(id))?;
        if !original.status.is_retryable() {
            return Err(QueueError::NotRetryable {
                job_id: id,
                status: original.status,
            });
        }

        let attempt = original.retry_attempt(time::now());
        let new_id = attempt.id;

        info!(
            job_id = %new_id,
            retry_of = %id,
            file = %attempt.display_name,
            attempt = attempt.attempt,
            "Job retried"
        );

        self.shared.emit_enqueued(&attempt);
        self.shared.event_bus.emit_lossy(QueueEvent::JobRetried {
            original_job_id: id,
            new_job_id: new_id,
            attempt: attempt.attempt,
            timestamp: attempt.enqueued_at,
        });

        state.push_pending(attempt);
        state.retried.insert(id);
        Ok(new_id)
    }

    /// Retry every `error`/`cancelled` job that has not been retried yet
    pub fn retry_all_failed(&self) -> Vec<Uuid> {
        let mut state = self.shared.lock();
        let targets: Vec<Uuid> = state
            .ordered_jobs()
            .filter(|job| job.status.is_retryable() && !state.retried.contains(&job.id))
            .map(|job| job.id)
            .collect();

        let new_ids: Vec<Uuid> = targets
            .into_iter()
            .filter_map(|id| self.retry_locked(&mut state, id).ok())
            .collect();

        self.shared.dispatch(&mut state);
        self.shared.publish_outstanding(&state);
        new_ids
    }

    /// Remove every terminal job, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        let finished: HashSet<Uuid> = state
            .jobs
            .values()
            .filter(|job| job.is_terminal())
            .map(|job| job.id)
            .collect();

        state.jobs.retain(|id, _| !finished.contains(id));
        state.order.retain(|id| !finished.contains(id));
        state.retried.retain(|id| !finished.contains(id));

        let removed = finished.len();
        info!(removed, remaining = state.jobs.len(), "Finished jobs cleared");
        self.shared.event_bus.emit_lossy(QueueEvent::QueueCleared {
            removed,
            timestamp: time::now(),
        });
        removed
    }

    /// Point-in-time copy of every tracked job, in enqueue order
    pub fn snapshot(&self) -> Vec<ImportJob> {
        self.shared.lock().ordered_jobs().cloned().collect()
    }

    pub fn job(&self, id: Uuid) -> Option<ImportJob> {
        self.shared.lock().jobs.get(&id).cloned()
    }

    /// Batch progress across every tracked job
    pub fn summary(&self) -> ImportProgress {
        let state = self.shared.lock();
        ProgressAggregator::summarize(state.ordered_jobs(), time::now())
    }

    /// Jobs currently validating or importing
    pub fn active_count(&self) -> usize {
        self.shared.lock().active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.limiter.max()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.event_bus
    }

    /// Resolve once no job is pending or active
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.idle_tx.subscribe();
        // The sender lives in `shared`, which `self` keeps alive
        let _ = rx.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Cancel a job once `after` has elapsed
    ///
    /// The deadline does nothing if the job has finished by then.
    pub fn cancel_after(&self, id: Uuid, after: Duration) -> QueueResult<JoinHandle<()>> {
        if self.job(id).is_none() {
            return Err(QueueError::NotFound(id));
        }

        let queue = self.clone();
        Ok(self.shared.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            match queue.cancel(id) {
                Ok(()) => debug!(job_id = %id, after_ms = after.as_millis() as u64, "Deadline reached"),
                Err(e) => debug!(job_id = %id, error = %e, "Deadline skipped"),
            }
        }))
    }
}

impl std::fmt::Debug for ImportQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ImportQueueManager")
            .field("jobs", &state.jobs.len())
            .field("pending", &state.pending.len())
            .field("active", &state.active.len())
            .field("max_concurrent", &self.shared.limiter.max())
            .finish()
    }
}
