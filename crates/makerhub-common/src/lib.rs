//! # MakerHub Common
//!
//! Shared plumbing for the MakerHub offline worker crates.
//!
//! ## Features
//!
//! - Workspace-wide error type with categories and retry hints
//! - Logging configuration and setup
//! - Backoff policy and timeouts for host-scheduled work
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{with_timeout, BackoffPolicy};

/// Unified error type for MakerHub.
#[derive(Error, Debug)]
pub enum MakerHubError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MakerHubError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is worth another attempt later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MakerHubError::Timeout(_) | MakerHubError::Io(_))
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            MakerHubError::Config { .. } => "config",
            MakerHubError::Io(_) => "io",
            MakerHubError::Timeout(_) => "timeout",
            MakerHubError::NotFound(_) => "not_found",
            MakerHubError::Other(_) => "other",
        }
    }
}

/// Result type alias for MakerHub operations.
pub type Result<T> = std::result::Result<T, MakerHubError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap any error as a config error with context.
    fn config_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn config_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| MakerHubError::config_with_source(message, e))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| MakerHubError::NotFound(resource.into()))
    }
}
