//! Subprocess plumbing shared by every `git` invocation.
//!
//! Every call is a single-shot child with captured stdout and stderr.
//! `tokio::process::Command::output` drains both pipes concurrently while
//! waiting, which is what keeps large `format-patch`/`archive` bodies from
//! deadlocking on a full OS pipe buffer.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;

use crate::error::{GitError, Result};

/// Runs `git <args>` with `cwd` as the working directory, returning raw
/// output. Does not interpret the exit status -- callers decide what a
/// non-zero exit means for their operation.
pub async fn run(cwd: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .await
        .map_err(GitError::from)
}

/// Like [`run`], but maps a non-zero exit to [`GitError::Command`].
pub async fn run_checked(cwd: &Path, args: &[&str]) -> Result<Output> {
    let output = run(cwd, args).await?;
    if !output.status.success() {
        return Err(GitError::Command(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output)
}

/// Decodes stdout as UTF-8, lossily -- git output is not guaranteed valid
/// UTF-8 (filenames, binary blobs) but our callers only ever want text.
pub fn stdout_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
