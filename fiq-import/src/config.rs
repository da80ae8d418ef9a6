//! Queue settings resolution for fiq-import
//!
//! Provides multi-tier resolution with CLI → ENV → TOML → default priority.

use fiq_common::config::TomlConfig;
use fiq_common::{Error, Result};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

/// Active job cap when nothing else is configured
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Read size of the transcript importer when nothing else is configured
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub const MAX_CONCURRENT_ENV: &str = "FIQ_MAX_CONCURRENT";
pub const CHUNK_SIZE_ENV: &str = "FIQ_CHUNK_SIZE";

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub max_concurrent: Option<usize>,
    pub chunk_size: Option<usize>,
    pub allowed_extensions: Option<Vec<String>>,
}

/// Resolved queue settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub chunk_size: usize,
    /// Lower-cased, without leading dots; empty means the validator default
    pub allowed_extensions: Vec<String>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            allowed_extensions: Vec::new(),
        }
    }
}

impl QueueSettings {
    /// Resolve every setting from its highest-priority source
    ///
    /// # Errors
    /// `Error::Config` when an environment value does not parse or a
    /// resolved count is zero.
    pub fn resolve(overrides: &SettingsOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let max_concurrent = resolve_count(
            "max_concurrent",
            overrides.max_concurrent,
            MAX_CONCURRENT_ENV,
            toml_config.max_concurrent,
            DEFAULT_MAX_CONCURRENT,
        )?;

        let chunk_size = resolve_count(
            "chunk_size",
            overrides.chunk_size,
            CHUNK_SIZE_ENV,
            toml_config.chunk_size,
            DEFAULT_CHUNK_SIZE,
        )?;

        let allowed_extensions = overrides
            .allowed_extensions
            .as_ref()
            .or(toml_config.allowed_extensions.as_ref())
            .map(|exts| normalize_extensions(exts.as_slice()))
            .unwrap_or_default();

        Ok(Self {
            max_concurrent,
            chunk_size,
            allowed_extensions,
        })
    }
}

fn resolve_count(
    name: &str,
    cli: Option<usize>,
    env_var: &str,
    toml: Option<usize>,
    default: usize,
) -> Result<usize> {
    let (value, source) = if let Some(value) = cli {
        (value, "command line")
    } else if let Some(value) = read_env::<usize>(env_var)? {
        (value, "environment variable")
    } else if let Some(value) = toml {
        (value, "TOML config")
    } else {
        (default, "default")
    };

    if value == 0 {
        return Err(Error::Config(format!(
            "{} must be at least 1 (from {})",
            name, source
        )));
    }

    if source == "default" {
        debug!(setting = name, value, "Using default");
    } else {
        info!(setting = name, value, source, "Setting loaded");
    }
    Ok(value)
}

fn read_env<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Lower-case and strip leading dots: `".SRT"` → `"srt"`
///
/// Duplicates are dropped; the first occurrence keeps its position.
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    extensions
        .iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty() && seen.insert(ext.clone()))
        .collect()
}
