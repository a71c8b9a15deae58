//! Error types for the shard explorer

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerError {
    /// Malformed or missing schedule breakpoint, or an invalid config file.
    #[error("Configuration error: {0}")]
    Config(String),
    /// A persisted record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Persisted bytes, a bitmap or a public key could not be interpreted.
    #[error("Decode error: {0}")]
    Decode(String),
    /// A request parameter or height range was rejected before any scan work.
    #[error("Invalid parameter: {0}")]
    Boundary(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    /// The transport abandoned the scan; carries the height reached.
    #[error("Scan cancelled at height {0}")]
    Cancelled(u64),
}

impl ExplorerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExplorerError::NotFound(_))
    }
}

impl From<std::io::Error> for ExplorerError {
    fn from(err: std::io::Error) -> Self {
        ExplorerError::Io(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ExplorerError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ExplorerError::Decode(err.to_string())
    }
}

impl From<rusqlite::Error> for ExplorerError {
    fn from(err: rusqlite::Error) -> Self {
        ExplorerError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for ExplorerError {
    fn from(err: toml::de::Error) -> Self {
        ExplorerError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ExplorerError>;
