//! Tree listing, with a cached, bounded last-commit-touching-this-path
//! lookup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commits::CommitInfo;
use crate::engine::GitEngine;
use crate::error::{GitError, Result};
use crate::proc::{run, run_checked, stdout_string};

const LAST_COMMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single entry in a `git ls-tree` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub mode: String,
    pub is_file: bool,
    pub is_subtree: bool,
    /// Blob size in bytes; `None` for subtrees.
    pub size: Option<u64>,
    /// The most recent commit touching this path, best-effort (returns
    /// `None` rather than erroring if the bounded lookup times out).
    pub last_commit: Option<CommitInfo>,
}

impl GitEngine {
    /// Lists the immediate children of `path` (empty string for root) as
    /// seen from `rev`.
    pub async fn list_tree(&self, rev: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let head = self.resolve_rev(rev).await?;
        let spec = if path.is_empty() {
            format!("{head}:")
        } else {
            format!("{head}:{path}")
        };
        let output = run(self.path(), &["ls-tree", "-l", &spec]).await?;
        if !output.status.success() {
            return Err(GitError::FileNotFound(path.to_string()));
        }

        let mut entries = Vec::new();
        for line in stdout_string(&output).lines() {
            let Some(entry) = parse_ls_tree_line(line) else { continue };
            let entry_path = if path.is_empty() {
                entry.0.clone()
            } else {
                format!("{path}/{}", entry.0)
            };
            let last_commit = self.last_commit_for_path(&head, &entry_path).await;
            entries.push(TreeEntry {
                name: entry.0,
                mode: entry.1,
                is_file: entry.2 == "blob",
                is_subtree: entry.2 == "tree",
                size: entry.3,
                last_commit,
            });
        }
        Ok(entries)
    }

    /// Bounded (best-effort, ≤2s) lookup of the last commit to touch
    /// `entry_path`, cached by `(repo_path, head_hash, entry_path)`.
    async fn last_commit_for_path(&self, head: &str, entry_path: &str) -> Option<CommitInfo> {
        let key = (
            self.path().display().to_string(),
            head.to_string(),
            entry_path.to_string(),
        );
        if let Some(cached) = self.caches.last_commit_get(&key) {
            return Some(cached);
        }

        let repo_path = self.path().to_path_buf();
        let head = head.to_string();
        let entry_path_owned = entry_path.to_string();
        let fetch = async move {
            run_checked(
                &repo_path,
                &[
                    "log",
                    &head,
                    "-1",
                    "--format=%H\x1f%an\x1f%ae\x1f%at\x1f%B\x1e",
                    "--",
                    &entry_path_owned,
                ],
            )
            .await
        };

        let output = match tokio::time::timeout(LAST_COMMIT_TIMEOUT, fetch).await {
            Ok(Ok(output)) => output,
            _ => return None,
        };
        let raw = stdout_string(&output);
        let record = raw.trim_end_matches('\x1e');
        let commit = CommitInfo::parse_record(record)?;
        self.caches.last_commit_put(key, commit.clone());
        Some(commit)
    }
}

/// Parses one `git ls-tree -l` line: `<mode> <type> <sha>\t<size>\t<name>`.
fn parse_ls_tree_line(line: &str) -> Option<(String, String, String, Option<u64>)> {
    let (meta, name) = line.split_once('\t')?;
    let mut parts = meta.split_whitespace();
    let mode = parts.next()?.to_string();
    let kind = parts.next()?.to_string();
    let _sha = parts.next()?;
    let size = parts.next().and_then(|s| s.parse().ok());
    Some((name.to_string(), mode, kind, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_blob_line() {
        let line = "100644 blob 1234567890abcdef1234567890abcdef12345678\t42\tREADME.md";
        let (name, mode, kind, size) = parse_ls_tree_line(line).unwrap();
        assert_eq!(name, "README.md");
        assert_eq!(mode, "100644");
        assert_eq!(kind, "blob");
        assert_eq!(size, Some(42));
    }

    #[test]
    fn parses_tree_line_without_size() {
        let line = "040000 tree 1234567890abcdef1234567890abcdef12345678\t-\tsrc";
        let (name, mode, kind, size) = parse_ls_tree_line(line).unwrap();
        assert_eq!(name, "src");
        assert_eq!(mode, "040000");
        assert_eq!(kind, "tree");
        assert_eq!(size, None);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_ls_tree_line("garbage").is_none());
    }
}
