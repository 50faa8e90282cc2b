/// Error types for the curation pipeline
///
/// Only preparation and grading failures ever reach an item's status.
/// Capture-time extraction never fails outward and sidecar persistence
/// failures are logged and swallowed by the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, CuratorError>;

#[derive(Debug, Error)]
pub enum CuratorError {
    /// File read/write failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decode or re-encode failure while preparing a payload
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Transport or API failure from the grading service
    #[error("Grading failed: {0}")]
    Grading(String),

    /// Grading service rejected the call for rate/quota reasons
    #[error("Grading quota exceeded: {0}")]
    Quota(String),

    /// Group response did not contain a result for this member
    #[error("No grading result returned for {0}")]
    MissingResult(String),

    /// Sidecar could not be read or written
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation refused while a batch is in flight
    #[error("Busy: {0}")]
    Busy(String),

    /// Unknown item id
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Folder could not be scanned
    #[error("Cannot scan {0}: {1}")]
    Scan(PathBuf, String),

    /// Background task panicked or was cancelled
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<serde_json::Error> for CuratorError {
    fn from(err: serde_json::Error) -> Self {
        CuratorError::Metadata(err.to_string())
    }
}

impl From<reqwest::Error> for CuratorError {
    fn from(err: reqwest::Error) -> Self {
        CuratorError::Grading(err.to_string())
    }
}
