//! Git engine error types.

use thiserror::Error;

/// Errors that can occur during repository operations. `RepoNotFound` and
/// friends are non-fatal, 404-style errors; everything else is opaque to
/// callers.
#[derive(Debug, Error)]
pub enum GitError {
    /// The bare repository does not exist on disk.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// The repository already exists where a create/fork was attempted.
    #[error("repository already exists: {0}")]
    RepoExists(String),

    /// The named ref does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// The named branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The requested path does not exist in the tree.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The requested revision could not be resolved.
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// A `git` subprocess exited non-zero.
    #[error("git command failed: {0}")]
    Command(String),

    /// A patch failed to apply cleanly. Carries one entry per conflicting
    /// file.
    #[error("merge conflict: {message}")]
    MergeConflict {
        conflicts: Vec<Conflict>,
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single conflicting file from a failed `git apply --check`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conflict {
    pub filename: String,
    pub reason: String,
}

/// A specialized Result type for git engine operations.
pub type Result<T> = std::result::Result<T, GitError>;
