//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(format!("filesystem error: {err}"))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Classify a failed write: unique violations become `AlreadyExists`,
/// foreign-key and check failures become `Constraint`.
pub(crate) fn classify_write_error(err: sqlx::Error, what: impl Into<String>) -> MetadataError {
    if let sqlx::Error::Database(db_err) = &err {
        let msg = db_err.message();
        if msg.contains("UNIQUE constraint") {
            return MetadataError::AlreadyExists(what.into());
        }
        if msg.contains("FOREIGN KEY constraint") || msg.contains("CHECK constraint") {
            return MetadataError::Constraint(format!("{}: {msg}", what.into()));
        }
    }
    MetadataError::Database(err)
}
