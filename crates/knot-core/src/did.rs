//! Decentralized Identifier handling.
//!
//! A DID is an opaque string of the form `did:<method>:<id>`. It is treated
//! as an immutable key and compared byte-exact; the only transformation this
//! crate performs on it is the "flattened" form used for URL-safe path
//! segments (`:` replaced with `-`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A decentralized identifier, e.g. `did:plc:abc123`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Wraps a string as a `Did` after checking it has the `did:` prefix and
    /// at least two colon-separated segments after it.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !s.starts_with("did:") {
            return Err(Error::invalid_input("did", "must start with 'did:'"));
        }
        let rest = &s["did:".len()..];
        let mut parts = rest.splitn(2, ':');
        let method = parts.next().unwrap_or("");
        let id = parts.next().unwrap_or("");
        if method.is_empty() || id.is_empty() {
            return Err(Error::invalid_input(
                "did",
                "must have the shape did:<method>:<id>",
            ));
        }
        Ok(Self(s))
    }

    /// Returns the DID as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the "flattened" form, replacing every `:` with `-`, suitable
    /// for use as a single URL path segment.
    #[must_use]
    pub fn flatten(&self) -> String {
        self.0.replace(':', "-")
    }

    /// Parses a possibly-flattened DID, unflattening it first if it does not
    /// already start with `did:`.
    pub fn unflatten(s: &str) -> Result<Self> {
        if s.starts_with("did:") {
            return Self::parse(s);
        }
        Self::parse(s.replacen('-', ":", 2))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_did() {
        let did = Did::parse("did:plc:abc123").unwrap();
        assert_eq!(did.as_str(), "did:plc:abc123");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(Did::parse("plc:abc123").is_err());
    }

    #[test]
    fn rejects_missing_id() {
        assert!(Did::parse("did:plc:").is_err());
        assert!(Did::parse("did:plc").is_err());
    }

    #[test]
    fn flatten_round_trips() {
        let did = Did::parse("did:plc:abc123").unwrap();
        let flat = did.flatten();
        assert_eq!(flat, "did-plc-abc123");
        let back = Did::unflatten(&flat).unwrap();
        assert_eq!(back, did);
    }

    #[test]
    fn unflatten_accepts_already_colon_form() {
        let back = Did::unflatten("did:plc:abc123").unwrap();
        assert_eq!(back.as_str(), "did:plc:abc123");
    }

    #[test]
    fn byte_exact_comparison() {
        let a = Did::parse("did:plc:abc").unwrap();
        let b = Did::parse("did:plc:abd").unwrap();
        assert_ne!(a, b);
    }
}
