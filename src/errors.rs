//! Errors for moon extractions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoonExtractionsError {
    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid extraction status: {0}")]
    InvalidStatus(String),

    #[error("Extraction timers out of order for structure {structure_id}")]
    InvalidTimers { structure_id: i64 },

    #[error("Fetching extractions failed for corporation {corporation_id}: {message}")]
    FetchError { corporation_id: i64, message: String },

    #[error("Sync for corporation {corporation_id} timed out after {seconds} s")]
    Timeout { corporation_id: i64, seconds: u64 },

    #[error("Database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Task join error")]
    JoinError(#[from] tokio::task::JoinError),
}

/// Failure of a best-effort metadata lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("not found")]
    NotFound,

    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for LookupError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => LookupError::NotFound,
            other => LookupError::Unavailable(other.to_string()),
        }
    }
}
