//! Error types for burrowkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BurrowError
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Unified error type for burrowkv operations
#[derive(Debug, Error)]
pub enum BurrowError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    /// Rejected before any page is touched
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    /// A previous commit failed after its meta page was written
    #[error("Store poisoned by a failed commit; reopen required")]
    Poisoned,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BurrowError {
    fn from(e: bincode::Error) -> Self {
        BurrowError::Serialization(e.to_string())
    }
}
