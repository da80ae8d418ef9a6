//! Scripted validator and importer

use fiq_import::{ImportError, ImportJob, Importer, JobContext, ValidationError, Validator};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// One scripted importer action
#[derive(Debug, Clone)]
pub enum Step {
    /// Report progress at a checkpoint
    Progress(f64),
    /// Return `Failed(reason)`
    Fail(String),
    /// Wait for a gate permit; return `Cancelled` if cancelled first
    Hold,
    /// Wait for a gate permit without watching for cancellation
    HoldIgnoringCancel,
    Panic(String),
}

/// Importer that replays a per-file script
///
/// Each invocation for a display name consumes the next script queued for
/// it; a file with no script left completes immediately.
pub struct ScriptedImporter {
    scripts: Mutex<HashMap<String, VecDeque<Vec<Step>>>>,
    gate: Arc<Semaphore>,
    started: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

impl ScriptedImporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            gate: Arc::new(Semaphore::new(0)),
            started: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Queue a script for the next invocation on `name`
    pub fn script(&self, name: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(steps);
    }

    /// Let `n` held steps continue
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Display names in the order imports started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Importer for ScriptedImporter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn import(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ImportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        self.started.lock().unwrap().push(job.display_name.clone());
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&job.display_name)
            .and_then(|queued| queued.pop_front())
            .unwrap_or_default();

        for step in steps {
            match step {
                Step::Progress(p) => ctx.checkpoint(p)?,
                Step::Fail(reason) => return Err(ImportError::Failed(reason)),
                Step::Hold => {
                    tokio::select! {
                        _ = self.pass_gate() => {}
                        _ = ctx.cancelled() => return Err(ImportError::Cancelled),
                    }
                }
                Step::HoldIgnoringCancel => self.pass_gate().await,
                Step::Panic(message) => panic!("{}", message),
            }
        }

        Ok(())
    }
}

/// Validator rejecting or holding chosen files
#[derive(Default)]
pub struct ScriptedValidator {
    reject: HashSet<String>,
    hold: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn accept_all() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reject: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Files that stay in validation until cancelled
    pub fn holding(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            hold: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Display names validated, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Validator for ScriptedValidator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn validate(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ValidationError> {
        self.seen.lock().unwrap().push(job.display_name.clone());

        if self.hold.contains(&job.display_name) {
            ctx.cancelled().await;
            return Err(ValidationError::Cancelled);
        }
        if self.reject.contains(&job.display_name) {
            return Err(ValidationError::Rejected(format!(
                "Invalid file format: {}",
                job.display_name
            )));
        }
        Ok(())
    }
}
