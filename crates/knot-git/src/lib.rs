//! Pure-function-style wrapper over bare Git repositories on disk: reads
//! (log, tree, blob, branches, tags, diff, format-patch, archive,
//! languages) and writes (fork-clone, hidden-ref fetch, set-HEAD,
//! merge-apply/push), all by shelling out to `git`.

mod archive;
mod caches;
mod commits;
mod content;
mod diff;
mod engine;
mod error;
mod fork;
mod lang;
mod patch;
mod proc;
mod refs;
mod tree;

pub use archive::spawn_archive_stream;
pub use caches::{Caches, MergeCheckOutcome};
pub use commits::CommitInfo;
pub use content::{raw_content_type, FileContent};
pub use diff::{CommitDiff, CommitMeta, FileDiff, RevDiff};
pub use engine::GitEngine;
pub use error::{Conflict, GitError, Result};
pub use fork::ForkStatus;
pub use lang::LanguageBreakdown;
pub use patch::{CommitIdentity, FormattedCommit, PatchSeries};
pub use refs::{Branch, Tag};
pub use tree::TreeEntry;
