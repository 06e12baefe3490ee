//! Forking a remote repository and tracking hidden refs for ahead/behind
//! comparisons without polluting the fork's normal refspace.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::caches::Caches;
use crate::engine::GitEngine;
use crate::error::Result;
use crate::proc::{run_checked, stdout_string};

/// How far a fork's local branch has drifted from the upstream ref last
/// tracked by [`GitEngine::track_hidden_remote_ref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkStatus {
    /// Commits on the fork's branch that the tracked upstream ref lacks.
    pub ahead: usize,
    /// Commits on the tracked upstream ref that the fork's branch lacks.
    pub behind: usize,
}

impl GitEngine {
    /// Clones `source_url` bare into `dest_path`, fetching every branch
    /// (not just the default) at depth 1, and hides the usual receive
    /// refspace so pushed-to forks don't leak history into listings.
    pub async fn fork(source_url: &str, dest_path: impl Into<PathBuf>, caches: Arc<Caches>) -> Result<Self> {
        let dest_path = dest_path.into();
        run_checked(
            std::path::Path::new("."),
            &[
                "clone",
                "--bare",
                "--depth=1",
                "--no-single-branch",
                source_url,
                &dest_path.display().to_string(),
            ],
        )
        .await?;
        run_checked(
            &dest_path,
            &["config", "receive.hideRefs", "refs/hidden"],
        )
        .await?;
        GitEngine::open(dest_path, caches)
    }

    /// Fetches `source_url`'s `refs/heads/<fork_ref>` into this fork's
    /// `refs/hidden/<fork_ref>/<remote_ref>`, so the fork can be compared
    /// against its upstream without a second remote.
    pub async fn track_hidden_remote_ref(
        &self,
        source_url: &str,
        fork_ref: &str,
        remote_ref: &str,
    ) -> Result<()> {
        let refspec = format!(
            "refs/heads/{fork_ref}:refs/hidden/{fork_ref}/{remote_ref}"
        );
        run_checked(self.path(), &["fetch", source_url, &refspec]).await?;
        Ok(())
    }

    /// Ahead/behind of `refs/heads/<fork_ref>` against the hidden ref last
    /// fetched by [`Self::track_hidden_remote_ref`].
    pub async fn fork_status(&self, fork_ref: &str, remote_ref: &str) -> Result<ForkStatus> {
        let hidden_ref = format!("refs/hidden/{fork_ref}/{remote_ref}");
        let range = format!("refs/heads/{fork_ref}...{hidden_ref}");
        let output = run_checked(self.path(), &["rev-list", "--left-right", "--count", &range]).await?;
        let counts = stdout_string(&output);
        let mut parts = counts.split_whitespace();
        let ahead = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let behind = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Ok(ForkStatus { ahead, behind })
    }

    /// Re-fetches `source_url`'s `fork_ref` into the hidden tracking ref,
    /// then reports the fork's ahead/behind against the refreshed tip.
    pub async fn fork_sync(&self, source_url: &str, fork_ref: &str, remote_ref: &str) -> Result<ForkStatus> {
        self.track_hidden_remote_ref(source_url, fork_ref, remote_ref).await?;
        self.fork_status(fork_ref, remote_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn track_hidden_remote_ref_resolves_after_fetch() {
        let upstream_dir = tempfile::TempDir::new().unwrap();
        let upstream_path = upstream_dir.path().join("upstream.git");
        let caches = Arc::new(Caches::new());
        let upstream = GitEngine::init_bare(&upstream_path, caches.clone()).await.unwrap();

        // seed a commit on `main` in a working clone, then push it back
        let work_dir = tempfile::TempDir::new().unwrap();
        run_checked(work_dir.path(), &["init", "--initial-branch=main"]).await.unwrap();
        std::fs::write(work_dir.path().join("a.txt"), b"hi").unwrap();
        run_checked(work_dir.path(), &["add", "a.txt"]).await.unwrap();
        run_checked(
            work_dir.path(),
            &["-c", "user.name=t", "-c", "user.email=t@t.com", "commit", "-m", "init"],
        )
        .await
        .unwrap();
        run_checked(
            work_dir.path(),
            &["push", &upstream_path.display().to_string(), "main"],
        )
        .await
        .unwrap();

        let fork_path = upstream_dir.path().join("fork.git");
        let fork = GitEngine::fork(&upstream_path.display().to_string(), &fork_path, caches)
            .await
            .unwrap();

        fork.track_hidden_remote_ref(&upstream_path.display().to_string(), "main", "main")
            .await
            .unwrap();

        let upstream_tip = upstream.resolve_rev("main").await.unwrap();
        let hidden_tip = fork.resolve_rev("refs/hidden/main/main").await.unwrap();
        assert_eq!(upstream_tip, hidden_tip);
    }

    #[tokio::test]
    async fn fork_status_reports_ahead_and_behind_after_divergent_pushes() {
        let root = tempfile::TempDir::new().unwrap();
        let upstream_path = root.path().join("upstream.git");
        let caches = Arc::new(Caches::new());
        GitEngine::init_bare(&upstream_path, caches.clone()).await.unwrap();

        let work = tempfile::TempDir::new().unwrap();
        run_checked(work.path(), &["init", "--initial-branch=main"]).await.unwrap();
        std::fs::write(work.path().join("a.txt"), b"hi").unwrap();
        run_checked(work.path(), &["add", "a.txt"]).await.unwrap();
        run_checked(
            work.path(),
            &["-c", "user.name=t", "-c", "user.email=t@t.com", "commit", "-m", "init"],
        )
        .await
        .unwrap();
        run_checked(work.path(), &["push", &upstream_path.display().to_string(), "main"])
            .await
            .unwrap();

        let fork_path = root.path().join("fork.git");
        let fork = GitEngine::fork(&upstream_path.display().to_string(), &fork_path, caches.clone())
            .await
            .unwrap();
        fork.track_hidden_remote_ref(&upstream_path.display().to_string(), "main", "main")
            .await
            .unwrap();

        let status = fork.fork_status("main", "main").await.unwrap();
        assert_eq!(status, ForkStatus { ahead: 0, behind: 0 });

        // upstream gains a commit the fork hasn't fetched yet
        run_checked(
            work.path(),
            &["-c", "user.name=t", "-c", "user.email=t@t.com", "commit", "--allow-empty", "-m", "upstream only"],
        )
        .await
        .unwrap();
        run_checked(work.path(), &["push", &upstream_path.display().to_string(), "main"])
            .await
            .unwrap();

        // the fork gains a commit of its own, pushed directly into it
        let fork_work = tempfile::TempDir::new().unwrap();
        run_checked(
            root.path(),
            &["clone", &fork_path.display().to_string(), &fork_work.path().display().to_string()],
        )
        .await
        .unwrap();
        run_checked(
            fork_work.path(),
            &["-c", "user.name=t", "-c", "user.email=t@t.com", "commit", "--allow-empty", "-m", "fork only"],
        )
        .await
        .unwrap();
        run_checked(fork_work.path(), &["push", "origin", "main"]).await.unwrap();

        let status = fork.fork_sync(&upstream_path.display().to_string(), "main", "main").await.unwrap();
        assert_eq!(status, ForkStatus { ahead: 1, behind: 1 });
    }
}
