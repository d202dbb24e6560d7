//! Error type shared by the storage ports.

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data integrity error.
    #[error("Data integrity error: {0}")]
    Integrity(String),

    /// Missing required row.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
