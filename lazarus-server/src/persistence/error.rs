// Persistence error types

use lazarus_utils::recovery::UnknownVariant;

/// Errors that can occur during persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Database connection failed
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),
    /// Database query failed
    #[error("Database query failed: {0}")]
    QueryFailed(String),
    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),
    /// Serialization error (snapshot payload or runtime value)
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Stored row holds a value this build does not understand
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(i64),
    /// Database pool exhausted
    #[error("Database connection pool exhausted")]
    PoolExhausted,
    /// Database unavailable
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::QueryFailed("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => Self::PoolExhausted,
            sqlx::Error::PoolClosed => Self::DatabaseUnavailable("Pool closed".to_string()),
            _ => Self::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PersistenceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<UnknownVariant> for PersistenceError {
    fn from(err: UnknownVariant) -> Self {
        Self::CorruptRow(err.to_string())
    }
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
