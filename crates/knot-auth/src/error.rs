//! Enforcer error types.

use thiserror::Error;

/// Errors the enforcer can raise.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] knot_store::StoreError),

    /// `repo` did not match `did:*/name`.
    #[error("invalid repo identifier: {0}")]
    InvalidRepo(String),
}

/// A specialized Result type for enforcer operations.
pub type Result<T> = std::result::Result<T, AuthError>;
