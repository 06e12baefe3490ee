//! Blob retrieval and MIME classification for raw HTTP serving.

use sha2::{Digest, Sha256};

use crate::engine::GitEngine;
use crate::error::{GitError, Result};
use crate::proc::run;

/// A blob's content, classified for safe raw serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

/// The set of types this knot will serve with their natural content-type.
/// Everything else textual is forced to `text/plain` to defeat
/// MIME-sniffing-based XSS; everything else binary falls back to
/// `application/octet-stream`.
const RAW_TEXTUAL_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/yaml",
    "application/toml",
    "application/javascript",
    "application/ecmascript",
];

impl GitEngine {
    /// Reads the blob at `path` as seen from `rev`.
    pub async fn file_content(&self, rev: &str, path: &str) -> Result<FileContent> {
        let head = self.resolve_rev(rev).await?;
        let output = run(self.path(), &["show", &format!("{head}:{path}")]).await?;
        if !output.status.success() {
            return Err(GitError::FileNotFound(path.to_string()));
        }
        Ok(classify(output.stdout))
    }

    /// `sha256(content)`, used as the ETag for raw binary bodies.
    pub async fn content_etag(&self, rev: &str, path: &str) -> Result<String> {
        let content = self.file_content(rev, path).await?;
        let bytes = match content {
            FileContent::Text(s) => s.into_bytes(),
            FileContent::Binary(b) => b,
        };
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn classify(bytes: Vec<u8>) -> FileContent {
    match String::from_utf8(bytes) {
        Ok(s) if !s.as_bytes().contains(&0) => FileContent::Text(s),
        Ok(s) => FileContent::Binary(s.into_bytes()),
        Err(e) => FileContent::Binary(e.into_bytes()),
    }
}

/// Resolves the content-type to serve for `path`'s raw body. Only
/// `image/*`, `video/*`, `text/*`, and the closed set of textual
/// application types may be served with a real type; every other textual
/// body is forced to `text/plain; charset=utf-8`.
pub fn raw_content_type(path: &str, content: &FileContent) -> String {
    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    let is_text = matches!(content, FileContent::Text(_));

    let essence = guessed.essence_str();
    if guessed.type_() == mime_guess::mime::IMAGE
        || guessed.type_() == mime_guess::mime::VIDEO
        || guessed.type_() == mime_guess::mime::TEXT
        || RAW_TEXTUAL_TYPES.contains(&essence)
    {
        if is_text && guessed.type_() != mime_guess::mime::IMAGE && guessed.type_() != mime_guess::mime::VIDEO {
            return "text/plain; charset=utf-8".to_string();
        }
        return essence.to_string();
    }

    if is_text {
        "text/plain; charset=utf-8".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_valid_utf8_without_nul_as_text() {
        assert_eq!(classify(b"hello".to_vec()), FileContent::Text("hello".to_string()));
    }

    #[test]
    fn classifies_nul_bytes_as_binary() {
        assert!(matches!(classify(vec![0, 1, 2]), FileContent::Binary(_)));
    }

    #[test]
    fn classifies_invalid_utf8_as_binary() {
        assert!(matches!(classify(vec![0xff, 0xfe]), FileContent::Binary(_)));
    }

    #[test]
    fn textual_application_types_are_forced_to_plain() {
        let content = FileContent::Text("{}".to_string());
        assert_eq!(raw_content_type("data.json", &content), "text/plain; charset=utf-8");
    }

    #[test]
    fn images_keep_their_real_type() {
        let content = FileContent::Binary(vec![0xff, 0xd8]);
        assert_eq!(raw_content_type("photo.jpg", &content), "image/jpeg");
    }

    #[test]
    fn unknown_binary_falls_back_to_octet_stream() {
        let content = FileContent::Binary(vec![1, 2, 3]);
        assert_eq!(raw_content_type("data.bin", &content), "application/octet-stream");
    }
}
