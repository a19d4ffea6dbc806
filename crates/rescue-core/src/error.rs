//! Error types for rescue-core

use thiserror::Error;

/// Result type alias using rescue-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Message fragments that identify a connection invalidated out of band.
const INVALIDATED_SIGNATURES: [&str; 4] = [
    "database schema has changed",
    "connection closed",
    "connection is closed",
    "database connection is closing",
];

/// Errors that can occur in rescue-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// The queue store could not be opened or reopened
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store connection was invalidated and must be reopened
    #[error("Connection invalidated: {0}")]
    ConnectionInvalidated(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blob/object storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether this error means the store handle went stale and a reopen may recover it.
    pub fn is_connection_invalidated(&self) -> bool {
        match self {
            Self::ConnectionInvalidated(_) => true,
            Self::LibSql(_) | Self::Database(_) => {
                let message = self.to_string().to_ascii_lowercase();
                INVALIDATED_SIGNATURES
                    .iter()
                    .any(|signature| message.contains(signature))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_invalidated_connections() {
        assert!(Error::ConnectionInvalidated("closed".to_string()).is_connection_invalidated());
        assert!(
            Error::Database("SQLite failure: database schema has changed".to_string())
                .is_connection_invalidated()
        );
        assert!(!Error::Database("disk I/O error".to_string()).is_connection_invalidated());
        assert!(!Error::InvalidInput("connection closed".to_string()).is_connection_invalidated());
    }
}
