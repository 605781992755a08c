//! Error types for Anchormesh mesh operations.

use thiserror::Error;

/// Errors that can occur in mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Transport setup or send failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key or signature handling errors
    #[error("Identity error: {0}")]
    Identity(#[from] anchormesh_identity::IdentityError),

    /// Security validation failures
    #[error("Security error: {0}")]
    Security(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
