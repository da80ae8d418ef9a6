//! Per-job task: validation, then import

use super::{Outcome, Shared};
use crate::models::ImportJob;
use crate::types::{ImportError, JobContext, ValidationError};
use fiq_common::events::FailureKind;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Drive an admitted job to a terminal state
///
/// Always ends with exactly one `Shared::finish` call, which frees the slot.
pub(super) async fn run_job(shared: Arc<Shared>, job: ImportJob, token: CancellationToken) {
    let id = job.id;
    let outcome = execute(&shared, job, token).await;
    shared.finish(id, outcome);
}

async fn execute(shared: &Arc<Shared>, job: ImportJob, token: CancellationToken) -> Outcome {
    let reporter = {
        let shared = Arc::clone(shared);
        let id = job.id;
        move |progress: f64| shared.apply_progress(id, progress)
    };
    let ctx = JobContext::new(job.id, token.clone(), reporter);

    debug!(job_id = %job.id, validator = shared.validator.name(), "Validating");
    match guarded(shared.validator.validate(&job, &ctx)).await {
        Ok(Ok(())) => {}
        Ok(Err(ValidationError::Rejected(reason))) => {
            return Outcome::Failed {
                kind: FailureKind::ValidationRejected,
                message: reason,
            };
        }
        Ok(Err(ValidationError::Cancelled)) => return Outcome::Cancelled,
        Err(panic) => {
            error!(job_id = %job.id, validator = shared.validator.name(), panic = %panic, "Validator panicked");
            return Outcome::Failed {
                kind: FailureKind::ValidationRejected,
                message: format!("Validator panicked: {}", panic),
            };
        }
    }

    // Also covers a validator that accepted without looking at the token
    let Some(job) = shared.enter_importing(job.id) else {
        return Outcome::Cancelled;
    };

    debug!(job_id = %job.id, importer = shared.importer.name(), "Importing");
    match guarded(shared.importer.import(&job, &ctx)).await {
        Ok(Ok(())) if token.is_cancelled() => Outcome::Cancelled,
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(ImportError::Failed(reason))) => Outcome::Failed {
            kind: FailureKind::ImportFailed,
            message: reason,
        },
        Ok(Err(ImportError::Cancelled)) => Outcome::Cancelled,
        Err(panic) => {
            error!(job_id = %job.id, importer = shared.importer.name(), panic = %panic, "Importer panicked");
            Outcome::Failed {
                kind: FailureKind::ImportFailed,
                message: format!("Importer panicked: {}", panic),
            }
        }
    }
}

/// Run a plugin future, turning a panic into its message
async fn guarded<F: Future>(future: F) -> Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
