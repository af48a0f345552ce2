//! Error types for chatlog.

use thiserror::Error;

/// Result type alias using chatlog's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for chatlog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing the durable store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Imported document is structurally invalid
    #[error("Import format error: {0}")]
    ImportFormat(String),

    /// A node could not be turned into a message record
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
