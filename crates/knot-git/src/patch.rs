//! Format-patch generation across a revision range, and merge apply/check
//! by patching a disposable clone.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::caches::MergeCheckOutcome;
use crate::engine::GitEngine;
use crate::error::{Conflict, GitError, Result};
use crate::proc::{run, run_checked, stdout_string};

/// A single commit's formatted patch, plus its parsed metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedCommit {
    pub sha: String,
    pub change_id: Option<String>,
    pub raw: String,
}

/// The full output of a format-patch-over-range call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSeries {
    pub commits: Vec<FormattedCommit>,
}

/// Author/committer/message supplied by the caller for a non-mailbox
/// merge-apply commit.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Whether a merge-apply/merge-check patch is a mailbox-format series
/// (one or more `git format-patch` emails) or a bare unified diff.
fn is_mailbox_format(patch: &str) -> bool {
    patch.trim_start().starts_with("From ") || patch.contains("\nFrom: ")
}

/// Pulls a `Change-Id: <id>` header/trailer line out of mailbox-format
/// patch text, the same line [`GitEngine::format_patch_range`] splices in
/// via `--add-header`.
fn extract_change_id(patch: &str) -> Option<String> {
    patch
        .lines()
        .find_map(|line| line.strip_prefix("Change-Id: ").map(|s| s.trim().to_string()))
}

/// Ensures `message` carries `change_id` as its `Change-Id` trailer,
/// replacing an existing one rather than duplicating it.
fn with_change_id_trailer(message: &str, change_id: &str) -> String {
    let trimmed = message.trim_end();
    if trimmed.lines().any(|l| l.starts_with("Change-Id: ")) {
        trimmed
            .lines()
            .map(|l| {
                if l.starts_with("Change-Id: ") {
                    format!("Change-Id: {change_id}")
                } else {
                    l.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        format!("{trimmed}\n\nChange-Id: {change_id}\n")
    }
}

/// Reads a single `%`-format field of `sha`'s commit header (e.g. `%an`,
/// `%aI`) as a trimmed string.
async fn commit_field(clone_dir: &Path, sha: &str, format: &str) -> Result<String> {
    let output = run_checked(clone_dir, &["log", "-1", &format!("--format={format}"), sha]).await?;
    Ok(stdout_string(&output).trim().to_string())
}

/// Rewrites every commit `git am` introduced in `old_tip..HEAD` so its
/// message carries `change_id`, preserving each commit's tree, author, and
/// committer, then repoints `target_branch` at the rewritten tip. Mailbox
/// patches are applied by `git am` as plain commits with no `Change-Id`
/// trailer of their own, so the merge-apply contract requires stamping it
/// on afterward rather than relying on `git am` to carry it through.
async fn rewrite_change_id(clone_dir: &Path, old_tip: &str, target_branch: &str, change_id: &str) -> Result<()> {
    let range = format!("{old_tip}..HEAD");
    let list = run_checked(clone_dir, &["rev-list", "--reverse", &range]).await?;
    let shas: Vec<String> = stdout_string(&list)
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if shas.is_empty() {
        return Ok(());
    }

    let mut parent = old_tip.to_string();
    for sha in &shas {
        let tree_arg = format!("{sha}^{{tree}}");
        let tree = run_checked(clone_dir, &["rev-parse", &tree_arg]).await?;
        let tree = stdout_string(&tree).trim().to_string();

        let message = run_checked(clone_dir, &["log", "-1", "--format=%B", sha]).await?;
        let message = with_change_id_trailer(&stdout_string(&message), change_id);

        let author_name = commit_field(clone_dir, sha, "%an").await?;
        let author_email = commit_field(clone_dir, sha, "%ae").await?;
        let author_date = commit_field(clone_dir, sha, "%aI").await?;
        let committer_name = commit_field(clone_dir, sha, "%cn").await?;
        let committer_email = commit_field(clone_dir, sha, "%ce").await?;

        let output = tokio::process::Command::new("git")
            .current_dir(clone_dir)
            .env("GIT_AUTHOR_NAME", &author_name)
            .env("GIT_AUTHOR_EMAIL", &author_email)
            .env("GIT_AUTHOR_DATE", &author_date)
            .env("GIT_COMMITTER_NAME", &committer_name)
            .env("GIT_COMMITTER_EMAIL", &committer_email)
            .args(["commit-tree", &tree, "-p", &parent, "-m", &message])
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::Command(format!(
                "git commit-tree failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        parent = stdout_string(&output).trim().to_string();
    }

    let branch_ref = format!("refs/heads/{target_branch}");
    run_checked(clone_dir, &["update-ref", &branch_ref, &parent]).await?;
    Ok(())
}

impl GitEngine {
    /// Enumerates non-merge commits in `base..head`, oldest first, and
    /// formats each with `git format-patch -1`, splicing a `Change-Id`
    /// header when the source commit carries one.
    pub async fn format_patch_range(&self, base: &str, head: &str) -> Result<PatchSeries> {
        let base_sha = self.resolve_rev(base).await?;
        let head_sha = self.resolve_rev(head).await?;

        let list_output = run_checked(
            self.path(),
            &[
                "rev-list",
                "--no-merges",
                "--reverse",
                &format!("{base_sha}..{head_sha}"),
            ],
        )
        .await?;

        let mut commits = Vec::new();
        for sha in stdout_string(&list_output).lines().map(str::trim).filter(|s| !s.is_empty()) {
            let info = self.list_commits(sha, 0, 1).await?.into_iter().next();
            let change_id = info.and_then(|c| c.change_id);

            let mut args = vec!["format-patch", "-1", sha, "--stdout"];
            let header_arg;
            if let Some(id) = &change_id {
                header_arg = format!("Change-Id: {id}");
                args.push("--add-header");
                args.push(header_arg.as_str());
            }
            let output = run_checked(self.path(), &args).await?;
            commits.push(FormattedCommit {
                sha: sha.to_string(),
                change_id,
                raw: stdout_string(&output),
            });
        }
        Ok(PatchSeries { commits })
    }

    /// Clones the bare repo shallowly at `target_branch`, applies `patch`,
    /// and pushes the result back, without affecting the working tree. On
    /// success returns the new branch tip. On conflict returns
    /// [`GitError::MergeConflict`] with one entry per failing file.
    pub async fn merge_apply(
        &self,
        patch: &str,
        target_branch: &str,
        identity: &CommitIdentity,
    ) -> Result<String> {
        let clone_dir = TempDir::new()?;
        self.clone_shallow_branch(target_branch, clone_dir.path()).await?;

        if is_mailbox_format(patch) {
            let old_tip = run_checked(clone_dir.path(), &["rev-parse", "HEAD"]).await?;
            let old_tip = stdout_string(&old_tip).trim().to_string();
            self.apply_mailbox(clone_dir.path(), patch).await?;
            if let Some(change_id) = extract_change_id(patch) {
                rewrite_change_id(clone_dir.path(), &old_tip, target_branch, &change_id).await?;
            }
        } else {
            self.apply_unified_diff(clone_dir.path(), patch, identity).await?;
        }

        run_checked(clone_dir.path(), &["push", "origin", &format!("HEAD:{target_branch}")]).await?;
        let tip = run_checked(clone_dir.path(), &["rev-parse", "HEAD"]).await?;
        Ok(stdout_string(&tip).trim().to_string())
    }

    /// Same flow as [`Self::merge_apply`] but with `--check`: never
    /// mutates the bare repo. Cached by `(repo_path, head_hash, patch,
    /// target_branch)` for up to 48h.
    pub async fn merge_check(&self, patch: &str, target_branch: &str) -> Result<MergeCheckOutcome> {
        let head = self.resolve_rev(target_branch).await?;
        let digest = {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(patch.as_bytes());
            hex::encode(hasher.finalize())
        };
        let key = (
            self.path().display().to_string(),
            head.clone(),
            digest,
            target_branch.to_string(),
        );
        if let Some(cached) = self.caches.merge_check_get(&key) {
            return Ok(cached);
        }

        let clone_dir = TempDir::new()?;
        self.clone_shallow_branch(target_branch, clone_dir.path()).await?;

        let outcome = if is_mailbox_format(patch) {
            match self.check_mailbox(clone_dir.path(), patch).await {
                Ok(()) => MergeCheckOutcome::Clean,
                Err(GitError::MergeConflict { conflicts, .. }) => {
                    MergeCheckOutcome::Conflicted(conflicts)
                }
                Err(e) => return Err(e),
            }
        } else {
            match self.check_unified_diff(clone_dir.path(), patch).await {
                Ok(()) => MergeCheckOutcome::Clean,
                Err(GitError::MergeConflict { conflicts, .. }) => {
                    MergeCheckOutcome::Conflicted(conflicts)
                }
                Err(e) => return Err(e),
            }
        };

        self.caches.merge_check_put(key, outcome.clone());
        Ok(outcome)
    }

    async fn clone_shallow_branch(&self, branch: &str, dest: &Path) -> Result<()> {
        run_checked(
            Path::new("."),
            &[
                "clone",
                "--depth=1",
                "--single-branch",
                "--branch",
                branch,
                &self.path().display().to_string(),
                &dest.display().to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn apply_mailbox(&self, clone_dir: &Path, patch: &str) -> Result<()> {
        write_patch_stdin(clone_dir, &["am"], patch).await.map_err(|stderr| {
            GitError::MergeConflict {
                conflicts: parse_apply_check_stderr(&stderr),
                message: stderr,
            }
        })
    }

    async fn check_mailbox(&self, clone_dir: &Path, patch: &str) -> Result<()> {
        write_patch_stdin(clone_dir, &["am", "--3way"], patch).await.map_err(|stderr| {
            GitError::MergeConflict {
                conflicts: parse_apply_check_stderr(&stderr),
                message: stderr,
            }
        })?;
        // undo so the check flow never mutates the disposable clone's branch further than needed
        let _ = run(clone_dir, &["am", "--abort"]).await;
        Ok(())
    }

    async fn apply_unified_diff(
        &self,
        clone_dir: &Path,
        patch: &str,
        identity: &CommitIdentity,
    ) -> Result<()> {
        write_patch_stdin(clone_dir, &["apply"], patch).await.map_err(|stderr| {
            GitError::MergeConflict {
                conflicts: parse_apply_check_stderr(&stderr),
                message: stderr,
            }
        })?;
        run_checked(clone_dir, &["add", "-A"]).await?;
        run_checked(
            clone_dir,
            &[
                "-c",
                &format!("user.name={}", identity.name),
                "-c",
                &format!("user.email={}", identity.email),
                "commit",
                "-m",
                &identity.message,
            ],
        )
        .await?;
        Ok(())
    }

    async fn check_unified_diff(&self, clone_dir: &Path, patch: &str) -> Result<()> {
        write_patch_stdin(clone_dir, &["apply", "--check"], patch)
            .await
            .map_err(|stderr| GitError::MergeConflict {
                conflicts: parse_apply_check_stderr(&stderr),
                message: stderr,
            })
    }
}

/// Runs `git <args>` with `patch` piped to stdin. Returns `Ok(())` on
/// success, `Err(stderr)` on a non-zero exit.
async fn write_patch_stdin(cwd: &Path, args: &[&str], patch: &str) -> std::result::Result<(), String> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut child = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| e.to_string())?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(patch.as_bytes()).await;
    }

    let output = child.wait_with_output().await.map_err(|e| e.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Parses `git apply --check` stderr lines of the form
/// `error: patch failed: <file>:<line>` / `error: <file>: <reason>` into
/// per-file conflict structs.
fn parse_apply_check_stderr(stderr: &str) -> Vec<Conflict> {
    stderr
        .lines()
        .filter_map(|line| {
            let line = line.strip_prefix("error: ")?;
            let (filename, reason) = line.split_once(": ").unwrap_or((line, "patch does not apply"));
            Some(Conflict {
                filename: filename.trim_end_matches(char::is_numeric).trim_end_matches(':').to_string(),
                reason: reason.to_string(),
            })
        })
        .collect()
}
