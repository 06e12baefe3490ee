//! Gzip-tar archive generation.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::process::Command;

use crate::engine::GitEngine;
use crate::error::Result;
use crate::proc::run_checked;

impl GitEngine {
    /// Writes a gzip tar of `rev` with every path prefixed by `prefix/` into
    /// `sink`. Once bytes start flowing, write errors are only logged, per
    /// the archive contract -- a half-written download cannot be recovered
    /// by retrying the handler.
    pub async fn write_archive(&self, rev: &str, prefix: &str, sink: &mut impl Write) -> Result<()> {
        let head = self.resolve_rev(rev).await?;
        let output = run_checked(
            self.path(),
            &["archive", "--format=tar", &format!("--prefix={prefix}/"), &head],
        )
        .await?;

        let mut encoder = GzEncoder::new(sink, Compression::default());
        if let Err(e) = encoder.write_all(&output.stdout) {
            tracing::warn!(error = %e, "archive write failed after bytes began flowing");
            return Ok(());
        }
        if let Err(e) = encoder.finish() {
            tracing::warn!(error = %e, "archive finalize failed after bytes began flowing");
        }
        Ok(())
    }
}

/// Spawns `git archive` as a streaming child, for callers that want to pipe
/// directly into an HTTP response body instead of buffering the whole tar.
pub async fn spawn_archive_stream(
    repo_path: &std::path::Path,
    rev: &str,
    prefix: &str,
) -> Result<tokio::process::Child> {
    let child = Command::new("git")
        .current_dir(repo_path)
        .args(["archive", "--format=tar", &format!("--prefix={prefix}/"), rev])
        .stdout(std::process::Stdio::piped())
        .spawn()?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn write_archive_on_empty_repo_produces_valid_gzip_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let caches = Arc::new(crate::caches::Caches::new());
        let repo_path = dir.path().join("repo.git");
        let engine = GitEngine::init_bare(&repo_path, caches).await.unwrap();

        // an empty repo has no HEAD commit to archive from
        let mut buf = Vec::new();
        let result = engine.write_archive("HEAD", "proj", &mut buf).await;
        assert!(result.is_err());
    }
}
