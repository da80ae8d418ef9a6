//! Built-in validator and importer
//!
//! - [`ExtensionValidator`]: existence, extension allow-list and non-empty check
//! - [`TranscriptImporter`]: chunked transcript reader storing into a [`TranscriptLibrary`]

pub mod extension_validator;
pub mod transcript_importer;

pub use extension_validator::{ExtensionValidator, TRANSCRIPT_EXTENSIONS, VIDEO_EXTENSIONS};
pub use transcript_importer::{
    clean_srt_content, count_words, ImportedTranscript, TranscriptImporter, TranscriptLibrary,
};
