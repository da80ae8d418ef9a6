//! File format gate
//!
//! Accepts a file when it exists, is a regular file, carries an allowed
//! extension (case-insensitive) and is not empty.

use crate::config::normalize_extensions;
use crate::models::ImportJob;
use crate::types::{JobContext, ValidationError, Validator};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Transcript formats
pub const TRANSCRIPT_EXTENSIONS: &[&str] = &["txt", "srt", "vtt"];

/// Video formats
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Extension allow-list validator
#[derive(Debug, Clone)]
pub struct ExtensionValidator {
    allowed: BTreeSet<String>,
}

impl ExtensionValidator {
    /// Accept the given extensions (leading dots and case are ignored)
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            allowed: normalize_extensions(extensions).into_iter().collect(),
        }
    }

    pub fn transcripts() -> Self {
        Self::new(TRANSCRIPT_EXTENSIONS)
    }

    pub fn videos() -> Self {
        Self::new(VIDEO_EXTENSIONS)
    }

    pub fn allows(&self, extension: &str) -> bool {
        self.allowed.contains(&extension.to_lowercase())
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    async fn check(&self, path: &Path) -> Result<(), String> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err("File does not exist".to_string())
            }
            Err(e) => return Err(format!("Cannot read file: {}", e)),
        };

        if !metadata.is_file() {
            return Err("Not a regular file".to_string());
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .ok_or_else(|| "No file extension".to_string())?;

        if !self.allows(&extension) {
            return Err(format!("Invalid file format: .{}", extension));
        }

        if metadata.len() == 0 {
            return Err("File is empty".to_string());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Validator for ExtensionValidator {
    fn name(&self) -> &'static str {
        "extension"
    }

    async fn validate(&self, job: &ImportJob, ctx: &JobContext) -> Result<(), ValidationError> {
        ctx.check_cancelled()?;

        self.check(&job.source_path).await.map_err(|reason| {
            debug!(job_id = %job.id, path = %job.source_path.display(), reason = %reason, "File rejected");
            ValidationError::Rejected(reason)
        })?;

        ctx.checkpoint(0.0)?;
        Ok(())
    }
}
