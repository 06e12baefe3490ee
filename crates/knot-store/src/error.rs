//! Store error types.

use thiserror::Error;

/// Errors that can occur against the knot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The row was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A (de)serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
