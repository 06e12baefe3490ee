//! Commit listing and metadata.

use serde::{Deserialize, Serialize};

use crate::engine::GitEngine;
use crate::error::Result;
use crate::proc::{run_checked, stdout_string};

const FIELD_SEP: &str = "\x1f";
const RECORD_SEP: &str = "\x1e";
const LOG_FORMAT: &str = "%H\x1f%an\x1f%ae\x1f%at\x1f%B\x1e";

/// A single commit's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    /// Commit author time, seconds since epoch.
    pub time_us: i64,
    /// `Change-Id:` trailer, if the message carries one.
    pub change_id: Option<String>,
}

impl CommitInfo {
    pub(crate) fn parse_record(record: &str) -> Option<Self> {
        let mut fields = record.splitn(5, FIELD_SEP);
        let sha = fields.next()?.to_string();
        let author_name = fields.next()?.to_string();
        let author_email = fields.next()?.to_string();
        let time_us: i64 = fields.next()?.trim().parse().ok()?;
        let message = fields.next()?.trim_end_matches('\n').to_string();
        let change_id = message
            .lines()
            .find_map(|l| l.strip_prefix("Change-Id: "))
            .map(str::to_string);
        Some(Self {
            sha,
            author_name,
            author_email,
            message,
            time_us,
            change_id,
        })
    }
}

impl GitEngine {
    /// Lists commits reachable from `rev`, newest first, with offset-based
    /// pagination. Stable across concurrent pushes only if `rev` is a
    /// pinned commit hash rather than a moving ref.
    pub async fn list_commits(&self, rev: &str, offset: usize, limit: usize) -> Result<Vec<CommitInfo>> {
        let output = run_checked(
            self.path(),
            &[
                "log",
                rev,
                &format!("--format={LOG_FORMAT}"),
                &format!("--skip={offset}"),
                &format!("-n{limit}"),
            ],
        )
        .await?;
        Ok(parse_log(&stdout_string(&output)))
    }

    /// Total number of commits reachable from `rev`.
    pub async fn commit_count(&self, rev: &str) -> Result<usize> {
        let output = run_checked(self.path(), &["rev-list", "--count", rev]).await?;
        Ok(stdout_string(&output).trim().parse().unwrap_or(0))
    }

    /// Lists commits for an arbitrary set of `git log` revision arguments
    /// (e.g. `new ^other-branch --not ^this-branch`), capped at `limit`.
    /// Used for the ref-update commit tally, where the range can't be
    /// expressed as a single rev.
    pub async fn list_commits_for_revspecs(&self, revspecs: &[String], limit: usize) -> Result<Vec<CommitInfo>> {
        let format_arg = format!("--format={LOG_FORMAT}");
        let limit_arg = format!("-n{limit}");
        let mut args: Vec<&str> = vec!["log", &format_arg, &limit_arg];
        for spec in revspecs {
            args.push(spec.as_str());
        }
        let output = run_checked(self.path(), &args).await?;
        Ok(parse_log(&stdout_string(&output)))
    }
}

fn parse_log(raw: &str) -> Vec<CommitInfo> {
    raw.split(RECORD_SEP)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .filter_map(CommitInfo::parse_record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_record() {
        let raw = format!("abc123{FIELD_SEP}Jane{FIELD_SEP}jane@example.com{FIELD_SEP}1000{FIELD_SEP}hello\nChange-Id: I123\n{RECORD_SEP}");
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].sha, "abc123");
        assert_eq!(commits[0].author_email, "jane@example.com");
        assert_eq!(commits[0].time_us, 1000);
        assert_eq!(commits[0].change_id.as_deref(), Some("I123"));
    }

    #[test]
    fn parses_multiple_records_and_skips_empty_tail() {
        let raw = format!(
            "a{FIELD_SEP}n{FIELD_SEP}e{FIELD_SEP}1{FIELD_SEP}m1{RECORD_SEP}b{FIELD_SEP}n{FIELD_SEP}e{FIELD_SEP}2{FIELD_SEP}m2{RECORD_SEP}"
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].sha, "b");
    }

    #[test]
    fn missing_change_id_is_none() {
        let raw = format!("a{FIELD_SEP}n{FIELD_SEP}e{FIELD_SEP}1{FIELD_SEP}plain message{RECORD_SEP}");
        let commits = parse_log(&raw);
        assert_eq!(commits[0].change_id, None);
    }
}
