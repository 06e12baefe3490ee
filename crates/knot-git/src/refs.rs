//! Branch and tag listing via a single `for-each-ref` invocation.

use serde::{Deserialize, Serialize};

use crate::engine::GitEngine;
use crate::error::Result;
use crate::proc::{run_checked, stdout_string};

const FIELD_SEP: &str = "\x1f";
const FOR_EACH_REF_FORMAT: &str =
    "%(refname)\x1f%(objectname)\x1f%(taggerdate:unix)\x1f%(committerdate:unix)\x1f%(creatordate:unix)";

/// A branch, with the default flag set by comparing against HEAD's
/// symbolic target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub sha: String,
    pub is_default: bool,
}

/// A tag, annotated or lightweight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub sha: String,
    /// Sort key: tagger time for annotated tags, commit time otherwise.
    pub time_us: i64,
}

impl GitEngine {
    /// Lists branches, sorted by name, with the default branch flagged.
    pub async fn list_branches(&self) -> Result<Vec<Branch>> {
        let default = self.default_branch().await.ok();
        let output = run_checked(
            self.path(),
            &["for-each-ref", "--format", FOR_EACH_REF_FORMAT, "refs/heads/"],
        )
        .await?;

        let mut branches: Vec<Branch> = stdout_string(&output)
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(FIELD_SEP);
                let refname = fields.next()?;
                let sha = fields.next()?.to_string();
                let name = refname.strip_prefix("refs/heads/")?.to_string();
                let is_default = default.as_deref() == Some(name.as_str());
                Some(Branch { name, sha, is_default })
            })
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    /// Lists tags, sorted reverse-chronological (tagger time for annotated
    /// tags, commit time for lightweight ones).
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let output = run_checked(
            self.path(),
            &["for-each-ref", "--format", FOR_EACH_REF_FORMAT, "refs/tags/"],
        )
        .await?;

        let mut tags: Vec<Tag> = stdout_string(&output)
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(FIELD_SEP);
                let refname = fields.next()?;
                let sha = fields.next()?.to_string();
                let tagger_time = fields.next()?;
                let committer_time = fields.next()?;
                let creator_time = fields.next()?;
                let name = refname.strip_prefix("refs/tags/")?.to_string();
                let time_us = parse_unix(tagger_time)
                    .or_else(|| parse_unix(committer_time))
                    .or_else(|| parse_unix(creator_time))
                    .unwrap_or(0);
                Some(Tag { name, sha, time_us })
            })
            .collect();
        tags.sort_by(|a, b| b.time_us.cmp(&a.time_us));
        Ok(tags)
    }
}

fn parse_unix(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}
