//! Language breakdown by walking the tree and classifying blobs by
//! extension.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::GitEngine;
use crate::error::Result;

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(1);
const SNIFF_LIMIT: usize = 16 * 1024;

/// Coarse language classification; only `Programming` and `Markup` blobs
/// contribute to the byte breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LanguageGroup {
    Programming,
    Markup,
    Data,
    Other,
}

fn classify_extension(path: &str) -> Option<(&'static str, LanguageGroup)> {
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    let pair = match ext.as_str() {
        "rs" => ("Rust", LanguageGroup::Programming),
        "go" => ("Go", LanguageGroup::Programming),
        "py" => ("Python", LanguageGroup::Programming),
        "js" | "mjs" | "cjs" => ("JavaScript", LanguageGroup::Programming),
        "ts" | "tsx" => ("TypeScript", LanguageGroup::Programming),
        "c" | "h" => ("C", LanguageGroup::Programming),
        "cc" | "cpp" | "hpp" => ("C++", LanguageGroup::Programming),
        "java" => ("Java", LanguageGroup::Programming),
        "rb" => ("Ruby", LanguageGroup::Programming),
        "sh" | "bash" => ("Shell", LanguageGroup::Programming),
        "html" | "htm" => ("HTML", LanguageGroup::Markup),
        "xml" => ("XML", LanguageGroup::Markup),
        "md" | "markdown" => ("Markdown", LanguageGroup::Markup),
        "json" => ("JSON", LanguageGroup::Data),
        "yaml" | "yml" => ("YAML", LanguageGroup::Data),
        "toml" => ("TOML", LanguageGroup::Data),
        _ => return None,
    };
    Some(pair)
}

fn is_generated_or_binary(path: &str, sample: &[u8]) -> bool {
    if path.ends_with(".lock")
        || path.ends_with(".min.js")
        || path.starts_with("vendor/")
        || path.contains("/vendor/")
    {
        return true;
    }
    sample.contains(&0)
}

/// Per-language byte totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageBreakdown {
    pub bytes_by_language: HashMap<String, u64>,
}

impl GitEngine {
    /// Walks the tree at `rev`, reads up to 16 KiB of each non-generated,
    /// non-binary blob, and sums bytes per language. Bounded to 1s;
    /// returns whatever was accumulated so far on timeout.
    pub async fn analyze_languages(&self, rev: &str) -> Result<LanguageBreakdown> {
        let engine = self.clone();
        let rev = rev.to_string();
        let work = async move { engine.walk_and_classify(&rev, String::new()).await };

        Ok(tokio::time::timeout(ANALYSIS_TIMEOUT, work)
            .await
            .unwrap_or_else(|_| LanguageBreakdown::default()))
    }

    fn walk_and_classify<'a>(
        &'a self,
        rev: &'a str,
        path: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = LanguageBreakdown> + Send + 'a>> {
        Box::pin(async move {
            let mut totals = LanguageBreakdown::default();
            let Ok(entries) = self.list_tree(rev, &path).await else {
                return totals;
            };
            for entry in entries {
                let entry_path = if path.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{path}/{}", entry.name)
                };
                if entry.is_subtree {
                    let sub = self.walk_and_classify(rev, entry_path).await;
                    for (lang, bytes) in sub.bytes_by_language {
                        *totals.bytes_by_language.entry(lang).or_insert(0) += bytes;
                    }
                    continue;
                }
                let Some((lang, group)) = classify_extension(&entry_path) else { continue };
                if !matches!(group, LanguageGroup::Programming | LanguageGroup::Markup) {
                    continue;
                }
                let Ok(content) = self.file_content(rev, &entry_path).await else { continue };
                let bytes = match content {
                    crate::content::FileContent::Text(s) => s.into_bytes(),
                    crate::content::FileContent::Binary(b) => b,
                };
                if is_generated_or_binary(&entry_path, &bytes[..bytes.len().min(SNIFF_LIMIT)]) {
                    continue;
                }
                let counted = bytes.len().min(SNIFF_LIMIT) as u64;
                *totals.bytes_by_language.entry(lang.to_string()).or_insert(0) += counted;
            }
            totals
        })
    }
}
