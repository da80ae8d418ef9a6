//! # FIQ Common Library
//!
//! Shared code for the file import queue crates:
//! - Error type and result alias
//! - Event types (QueueEvent enum) and the broadcast EventBus
//! - TOML configuration loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
