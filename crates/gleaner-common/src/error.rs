//! Error types for Gleaner
//!
//! This module provides user-facing error types with clear, actionable
//! messages that help operators understand what went wrong and how to fix it.

use thiserror::Error;

/// Result type alias for Gleaner operations
pub type Result<T> = std::result::Result<T, GleanerError>;

/// Comprehensive error type for operator-facing operations
///
/// All errors are designed to be user-facing with clear messages and
/// suggestions.
#[derive(Error, Debug)]
pub enum GleanerError {
    /// Remote feed communication failed
    #[error("Feed error: {0}. Check that the feed URL is reachable and your token is valid.")]
    Feed(String),

    /// A channel is not present in the checkpoint file
    #[error("Channel '{0}' is not tracked. Add it first with 'gleaner channel add {0}'.")]
    UnknownChannel(String),

    /// Per-channel database operation failed
    #[error("Database error: {0}. Check disk space and permissions under the data directory.")]
    Database(String),

    /// Checkpoint file could not be written
    #[error("Checkpoint error: {0}. The in-memory state is intact; fix the path and retry.")]
    Checkpoint(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization failed
    #[error("Failed to parse JSON: {0}. Check the file syntax.")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables.")]
    Config(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GleanerError {
    /// Create a feed error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}
