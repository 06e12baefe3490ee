//! The core repository handle: a bare Git repository on disk, optionally
//! pinned to a revision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::caches::Caches;
use crate::error::{GitError, Result};
use crate::proc::{run, run_checked, stdout_string};

/// A pure-function-style wrapper over a bare repository on disk. Cloning is
/// cheap: the shared caches are reference-counted, and the path is an owned
/// `PathBuf`.
#[derive(Clone, Debug)]
pub struct GitEngine {
    repo_path: PathBuf,
    pub(crate) caches: Arc<Caches>,
}

impl GitEngine {
    /// Opens an existing bare repository at `repo_path`.
    pub fn open(repo_path: impl Into<PathBuf>, caches: Arc<Caches>) -> Result<Self> {
        let repo_path = repo_path.into();
        if !repo_path.join("HEAD").exists() {
            return Err(GitError::RepoNotFound(repo_path.display().to_string()));
        }
        Ok(Self { repo_path, caches })
    }

    /// Initializes a new bare repository at `repo_path`.
    pub async fn init_bare(repo_path: impl Into<PathBuf>, caches: Arc<Caches>) -> Result<Self> {
        let repo_path = repo_path.into();
        if repo_path.exists() {
            return Err(GitError::RepoExists(repo_path.display().to_string()));
        }
        tokio::fs::create_dir_all(&repo_path).await?;
        run_checked(&repo_path, &["init", "--bare", "--quiet"]).await?;
        Ok(Self { repo_path, caches })
    }

    /// The repository's path on disk.
    pub fn path(&self) -> &Path {
        &self.repo_path
    }

    /// Resolves `rev` (a ref name, short hash, or `HEAD`) to a full commit
    /// hash.
    pub async fn resolve_rev(&self, rev: &str) -> Result<String> {
        let output = run(&self.repo_path, &["rev-parse", "--verify", rev]).await?;
        if !output.status.success() {
            return Err(GitError::RevisionNotFound(rev.to_string()));
        }
        Ok(stdout_string(&output).trim().to_string())
    }

    /// The branch HEAD currently points at.
    pub async fn default_branch(&self) -> Result<String> {
        let output = run(&self.repo_path, &["symbolic-ref", "--short", "HEAD"]).await?;
        if !output.status.success() {
            return Err(GitError::RefNotFound("HEAD".to_string()));
        }
        Ok(stdout_string(&output).trim().to_string())
    }

    /// Repoints HEAD at `branch`.
    pub async fn set_default_branch(&self, branch: &str) -> Result<()> {
        self.resolve_rev(&format!("refs/heads/{branch}"))
            .await
            .map_err(|_| GitError::BranchNotFound(branch.to_string()))?;
        run_checked(
            &self.repo_path,
            &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(dir: &tempfile::TempDir) -> GitEngine {
        let caches = Arc::new(Caches::new());
        GitEngine::init_bare(dir.path().join("repo.git"), caches)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn init_bare_rejects_existing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let caches = Arc::new(Caches::new());
        let path = dir.path().join("repo.git");
        GitEngine::init_bare(&path, caches.clone()).await.unwrap();

        let err = GitEngine::init_bare(&path, caches).await;
        assert!(matches!(err, Err(GitError::RepoExists(_))));
    }

    #[tokio::test]
    async fn open_rejects_missing_repo() {
        let caches = Arc::new(Caches::new());
        let err = GitEngine::open("/nonexistent/path.git", caches);
        assert!(matches!(err, Err(GitError::RepoNotFound(_))));
    }

    #[tokio::test]
    async fn default_branch_errors_on_empty_repo() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = init_repo(&dir).await;
        assert!(engine.default_branch().await.is_err());
    }
}
