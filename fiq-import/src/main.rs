//! fiq-import - file import queue command line
//!
//! Validates and imports the given files with bounded concurrency, printing
//! lifecycle events and a final batch summary. Ctrl-C cancels every
//! unfinished job and waits for running imports to stop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fiq_common::events::{JobStatus, QueueEvent};
use fiq_import::config::{QueueSettings, SettingsOverrides};
use fiq_import::services::{
    ExtensionValidator, TranscriptImporter, TranscriptLibrary, VIDEO_EXTENSIONS,
};
use fiq_import::{FileDescriptor, ImportQueueManager};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for fiq-import
#[derive(Parser, Debug)]
#[command(name = "fiq-import")]
#[command(about = "Import transcript files through a bounded-concurrency queue")]
#[command(version)]
struct Args {
    /// Files to import
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Maximum number of files validated or imported at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Read chunk size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    /// TOML config file (default: $FIQ_CONFIG or <config dir>/fiq/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accepted file extension, repeatable (replaces the configured list)
    #[arg(short, long = "extension", value_name = "EXT")]
    extensions: Vec<String>,

    /// Accept the video extension set instead of transcripts
    #[arg(long, conflicts_with = "extensions")]
    video: bool,

    /// Print every queue event as a JSON line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = fiq_common::config::load_toml_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting fiq-import {}", env!("CARGO_PKG_VERSION"));

    let overrides = SettingsOverrides {
        max_concurrent: args.max_concurrent,
        chunk_size: args.chunk_size,
        allowed_extensions: if args.video {
            Some(VIDEO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect())
        } else if args.extensions.is_empty() {
            None
        } else {
            Some(args.extensions.clone())
        },
    };
    let settings = QueueSettings::resolve(&overrides, &toml_config)
        .context("Invalid queue settings")?;

    let validator = if settings.allowed_extensions.is_empty() {
        ExtensionValidator::transcripts()
    } else {
        ExtensionValidator::new(settings.allowed_extensions.as_slice())
    };
    info!(
        max_concurrent = settings.max_concurrent,
        chunk_size = settings.chunk_size,
        extensions = %validator.allowed().collect::<Vec<_>>().join(","),
        "Queue settings resolved"
    );

    let library = TranscriptLibrary::new();
    let queue = ImportQueueManager::builder(Arc::new(TranscriptImporter::new(
        library.clone(),
        settings.chunk_size,
    )))
    .validator(Arc::new(validator))
    .max_concurrent(settings.max_concurrent)
    .build()
    .context("Failed to create import queue")?;

    // Subscribe before enqueueing so no event is missed
    let events = queue.event_bus().subscribe();
    let printing_done = CancellationToken::new();
    let printer = tokio::spawn(print_events(
        queue.clone(),
        events,
        args.json,
        printing_done.clone(),
    ));

    queue.enqueue(args.paths.iter().map(FileDescriptor::from_path));

    run_until_idle(&queue, tokio::signal::ctrl_c()).await;

    // Every event is already in the channel once the queue is idle
    printing_done.cancel();
    if let Err(e) = printer.await {
        warn!("Event printer stopped abnormally: {}", e);
    }

    let summary = queue.summary();
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "Imported {}/{} file(s): {} failed, {} cancelled, {} words stored",
            summary.completed_files,
            summary.total_files,
            summary.failed_files,
            summary.cancelled_files,
            library.total_words().await,
        );
    }

    let failed: Vec<_> = queue
        .snapshot()
        .into_iter()
        .filter(|job| job.status == JobStatus::Error)
        .collect();
    for job in &failed {
        eprintln!(
            "  {}: {}",
            job.source_path.display(),
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    if !failed.is_empty() {
        anyhow::bail!("{} file(s) failed to import", failed.len());
    }
    Ok(())
}

/// Wait for the queue to go idle, cancelling everything once `interrupt` fires
///
/// If the interrupt handler cannot be installed the batch runs to completion.
async fn run_until_idle<F>(queue: &ImportQueueManager, interrupt: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        _ = queue.wait_idle() => {}
        signal = interrupt => match signal {
            Ok(()) => {
                let cancelled = queue.cancel_all();
                eprintln!("Interrupted, cancelling {} unfinished file(s)...", cancelled);
                queue.wait_idle().await;
            }
            Err(e) => {
                warn!("Failed to listen for Ctrl-C, running to completion: {}", e);
                queue.wait_idle().await;
            }
        },
    }
}

/// Hand every buffered event to `handle`, skipping over lag gaps
fn drain_buffered(rx: &mut broadcast::Receiver<QueueEvent>, mut handle: impl FnMut(QueueEvent)) {
    loop {
        match rx.try_recv() {
            Ok(event) => handle(event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged behind");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

/// Print queue events until `done` fires, then drain what is left
async fn print_events(
    queue: ImportQueueManager,
    mut rx: broadcast::Receiver<QueueEvent>,
    json: bool,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => print_event(&queue, event, json),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer lagged behind");
                }
                Err(RecvError::Closed) => return,
            },
            _ = done.cancelled() => {
                drain_buffered(&mut rx, |event| print_event(&queue, event, json));
                return;
            }
        }
    }
}

fn print_event(queue: &ImportQueueManager, event: QueueEvent, json: bool) {
    if json {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    let name = |id: Uuid| {
        queue
            .job(id)
            .map(|job| job.display_name)
            .unwrap_or_else(|| id.to_string())
    };

    match event {
        QueueEvent::JobStatusChanged {
            job_id,
            new_status,
            error_message,
            ..
        } => match error_message {
            Some(reason) => println!("[{}] {}: {}", new_status, name(job_id), reason),
            None => println!("[{}] {}", new_status, name(job_id)),
        },
        QueueEvent::JobRetried {
            new_job_id, attempt, ..
        } => println!("[retry] {} (attempt {})", name(new_job_id), attempt),
        _ => {}
    }
}
