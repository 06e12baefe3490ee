//! Single-commit diff (parent vs commit).

use serde::{Deserialize, Serialize};

use crate::commits::CommitInfo;
use crate::engine::GitEngine;
use crate::error::Result;
use crate::proc::{run_checked, stdout_string};

/// One file's changes within a diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub insertions: usize,
    pub deletions: usize,
    pub patch: String,
}

/// A commit diffed against its first parent (or the empty tree, for a
/// root commit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDiff {
    pub commit: CommitMeta,
    pub files: Vec<FileDiff>,
    pub insertions: usize,
    pub deletions: usize,
}

/// Commit metadata carried alongside a diff, serde-friendly subset of
/// [`CommitInfo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMeta {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub time_us: i64,
    pub change_id: Option<String>,
}

impl From<CommitInfo> for CommitMeta {
    fn from(c: CommitInfo) -> Self {
        Self {
            sha: c.sha,
            author_name: c.author_name,
            author_email: c.author_email,
            message: c.message,
            time_us: c.time_us,
            change_id: c.change_id,
        }
    }
}

/// A diff between two arbitrary revisions (branch, tag, or commit-ish),
/// without the single-commit metadata `CommitDiff` carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevDiff {
    pub base: String,
    pub head: String,
    pub files: Vec<FileDiff>,
    pub insertions: usize,
    pub deletions: usize,
}

impl GitEngine {
    /// Diffs `head` against `base` directly, for comparing two branches or
    /// tags rather than a single commit against its parent.
    pub async fn compare_revs(&self, base: &str, head: &str) -> Result<RevDiff> {
        let base_sha = self.resolve_rev(base).await?;
        let head_sha = self.resolve_rev(head).await?;
        let patch_output = run_checked(
            self.path(),
            &["diff", "--patch", "--numstat", &base_sha, &head_sha],
        )
        .await?;
        let raw = stdout_string(&patch_output);
        let (files, insertions, deletions) = parse_numstat_and_patch(&raw);
        Ok(RevDiff {
            base: base_sha,
            head: head_sha,
            files,
            insertions,
            deletions,
        })
    }

    /// Diffs `rev` against its first parent, returning per-file fragments
    /// and aggregate stats.
    pub async fn diff_commit(&self, rev: &str) -> Result<CommitDiff> {
        let sha = self.resolve_rev(rev).await?;
        let commits = self.list_commits(&sha, 0, 1).await?;
        let commit = commits
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::GitError::RevisionNotFound(rev.to_string()))?;

        let parent = format!("{sha}^");
        let base = if self.resolve_rev(&parent).await.is_ok() {
            parent
        } else {
            EMPTY_TREE.to_string()
        };

        let patch_output = run_checked(
            self.path(),
            &["diff", "--patch", "--numstat", &base, &sha],
        )
        .await?;
        let raw = stdout_string(&patch_output);
        let (files, insertions, deletions) = parse_numstat_and_patch(&raw);

        Ok(CommitDiff {
            commit: commit.into(),
            files,
            insertions,
            deletions,
        })
    }
}

/// The canonical empty-tree hash, used as a synthetic "parent" for root
/// commits.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// `git diff --numstat --patch` interleaves a numstat summary block with
/// the unified patch body; we only need the patch, split per-file, with
/// stats from the numstat header.
fn parse_numstat_and_patch(raw: &str) -> (Vec<FileDiff>, usize, usize) {
    let patch_start = raw.find("diff --git").unwrap_or(raw.len());
    let numstat = &raw[..patch_start];
    let patch = &raw[patch_start..];

    let mut stats = Vec::new();
    for line in numstat.lines() {
        let mut parts = line.split_whitespace();
        let ins = parts.next().and_then(|s| s.parse::<usize>().ok());
        let del = parts.next().and_then(|s| s.parse::<usize>().ok());
        let path = parts.next();
        if let (Some(ins), Some(del), Some(path)) = (ins, del, path) {
            stats.push((path.to_string(), ins, del));
        }
    }

    let mut files = Vec::new();
    let mut total_ins = 0;
    let mut total_del = 0;
    for chunk in split_patch_per_file(patch) {
        let path = chunk
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("diff --git a/"))
            .and_then(|l| l.split(" b/").next())
            .unwrap_or("")
            .to_string();
        let (ins, del) = stats
            .iter()
            .find(|(p, ..)| *p == path)
            .map(|(_, i, d)| (*i, *d))
            .unwrap_or((0, 0));
        total_ins += ins;
        total_del += del;
        files.push(FileDiff {
            path,
            insertions: ins,
            deletions: del,
            patch: chunk.to_string(),
        });
    }

    (files, total_ins, total_del)
}

fn split_patch_per_file(patch: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    for (idx, _) in patch.match_indices("diff --git") {
        starts.push(idx);
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(patch.len());
            &patch[start..end]
        })
        .collect()
}
