//! Transcript importer
//!
//! Reads a transcript in fixed-size chunks, reporting byte progress and
//! checking for cancellation after every chunk, then cleans subtitle markup,
//! counts words and stores the result in a [`TranscriptLibrary`].

use crate::models::ImportJob;
use crate::types::{ImportError, Importer, JobContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Share of the progress range spent reading; the rest covers processing
const READ_PHASE_PERCENT: f64 = 90.0;

/// Default transcript language
const DEFAULT_LANGUAGE: &str = "en";

/// Upper bound on the read buffer reserved up front
const MAX_PREALLOCATE: usize = 16 * 1024 * 1024;

/// A stored transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedTranscript {
    pub id: Uuid,
    /// Job that imported it
    pub job_id: Uuid,
    pub file_path: PathBuf,
    pub filename: String,
    /// Cleaned text
    pub content: String,
    pub word_count: usize,
    pub language: String,
    pub imported_at: DateTime<Utc>,
}

/// In-memory transcript store shared between importer and caller
#[derive(Debug, Clone, Default)]
pub struct TranscriptLibrary {
    transcripts: Arc<RwLock<Vec<ImportedTranscript>>>,
}

impl TranscriptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transcript: ImportedTranscript) {
        self.transcripts.write().await.push(transcript);
    }

    /// Every stored transcript, in import order
    pub async fn all(&self) -> Vec<ImportedTranscript> {
        self.transcripts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.transcripts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transcripts.read().await.is_empty()
    }

    pub async fn get_by_job(&self, job_id: Uuid) -> Option<ImportedTranscript> {
        self.transcripts
            .read()
            .await
            .iter()
            .find(|t| t.job_id == job_id)
            .cloned()
    }

    pub async fn total_words(&self) -> usize {
        self.transcripts.read().await.iter().map(|t| t.word_count).sum()
    }
}

/// Imports `.txt`, `.srt` and `.vtt` transcripts
#[derive(Debug, Clone)]
pub struct TranscriptImporter {
    library: TranscriptLibrary,
    chunk_size: usize,
}

impl TranscriptImporter {
    /// `chunk_size` is clamped to at least 1 byte
    pub fn new(library: TranscriptLibrary, chunk_size: usize) -> Self {
        Self {
            library,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn library(&self) -> &TranscriptLibrary {
        &self.library
    }

    /// Read the whole file, one checkpoint per chunk
    async fn read_chunked(&self, job: &ImportJob, ctx: &JobContext) -> Result<Vec<u8>, ImportError> {
        let mut file = tokio::fs::File::open(&job.source_path).await?;
        let on_disk = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        // The descriptor size is only a progress denominator, never a capacity
        let total = if on_disk > 0 { on_disk } else { job.size_bytes };

        let capacity = usize::try_from(on_disk).unwrap_or(0).min(MAX_PREALLOCATE);
        let mut content = Vec::with_capacity(capacity);
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            content.extend_from_slice(&buffer[..read]);

            let fraction = if total > 0 {
                (content.len() as f64 / total as f64).min(1.0)
            } else {
                0.0
            };
            ctx.checkpoint(fraction * READ_PHASE_PERCENT)?;
        }

        Ok(content)
    }
}

#[async_trait::async_trait]
impl Importer for TranscriptImporter {
    fn name(&self) -> &'static str {
        "transcript"
    }

    async fn import(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ImportError> {
        ctx.check_cancelled()?;

        let bytes = self.read_chunked(job, ctx).await?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ImportError::failed("Transcript is not valid UTF-8"))?;

        if content.trim().is_empty() {
            return Err(ImportError::failed("Transcript file is empty"));
        }

        let extension = job
            .source_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let cleaned = match extension.as_str() {
            "srt" | "vtt" => clean_srt_content(&content),
            _ => content,
        };
        let word_count = count_words(&cleaned);

        ctx.checkpoint(READ_PHASE_PERCENT + 5.0)?;

        let transcript = ImportedTranscript {
            id: Uuid::new_v4(),
            job_id: job.id,
            file_path: job.source_path.clone(),
            filename: job.display_name.clone(),
            content: cleaned,
            word_count,
            language: DEFAULT_LANGUAGE.to_string(),
            imported_at: Utc::now(),
        };

        // Last point where cancellation still leaves the library untouched
        ctx.check_cancelled()?;

        debug!(job_id = %job.id, transcript_id = %transcript.id, "Storing transcript");
        self.library.insert(transcript).await;

        info!(
            job_id = %job.id,
            file = %job.display_name,
            word_count,
            "Transcript imported"
        );
        Ok(())
    }
}

/// Strip subtitle markup, keeping only the spoken text
///
/// Drops cue sequence numbers, timing lines (`-->`), blank lines and a
/// `WEBVTT` header; the remaining lines are trimmed and joined with spaces.
pub fn clean_srt_content(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && line.parse::<u32>().is_err()
                && !line.contains("-->")
                && !line.starts_with("WEBVTT")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
