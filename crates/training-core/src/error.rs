//! Error types for the training support crates

use thiserror::Error;

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by the checkpoint and dataset crates
#[derive(Error, Debug)]
pub enum Error {
    // Checkpoint errors
    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: String },

    #[error("Checkpoint write failed: {message}")]
    CheckpointWriteFailed { message: String },

    #[error("Checkpoint corrupted: {path} - {reason}")]
    CheckpointCorrupted { path: String, reason: String },

    #[error("State mismatch for \"{name}\": {reason}")]
    StateMismatch { name: String, reason: String },

    // Dataset errors
    #[error("No shard files prepared for resolution level {lod}")]
    UnknownResolutionLevel { lod: usize },

    #[error("Invalid partition layout: {message}")]
    InvalidPartitionLayout { message: String },

    #[error("Malformed record in {path}: {reason}")]
    MalformedRecord { path: String, reason: String },

    #[error("Invalid batch: {message}")]
    InvalidBatch { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
