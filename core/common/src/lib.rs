//! Common types shared across Lenda modules.
//!
//! This module provides the error taxonomy and process configuration used
//! throughout the codebase.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::Record;
