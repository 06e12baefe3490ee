//! Path-safety primitives used anywhere a user-derived string is joined
//! against a filesystem root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Joins `component` onto `root`, rejecting any attempt to escape `root`.
///
/// Rejects absolute paths, `..` segments, and any other non-"normal" path
/// component. This is a pure, syntactic check: it does not consult the
/// filesystem, so it also rejects symlink-escape attempts made of multiple
/// components landing back inside `root` only via symlink indirection --
/// callers that need to defend against an on-disk symlink planted *inside*
/// `root` should canonicalize the result and re-check the prefix.
pub fn secure_join(root: &Path, component: &str) -> Result<PathBuf> {
    let candidate = Path::new(component);
    for part in candidate.components() {
        match part {
            Component::Normal(_) => {}
            _ => {
                return Err(Error::invalid_input(
                    "path",
                    format!("unsafe path component in '{component}'"),
                ));
            }
        }
    }
    if component.is_empty() {
        return Err(Error::invalid_input("path", "empty path component"));
    }
    Ok(root.join(candidate))
}

/// Joins multiple path components onto `root` in sequence, using
/// [`secure_join`] for each, so that no individual segment can introduce a
/// traversal even if a later segment would otherwise look safe in isolation.
pub fn secure_join_all<'a>(root: &Path, components: impl IntoIterator<Item = &'a str>) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for component in components {
        path = secure_join(Path::new(&path), component)?;
    }
    Ok(path)
}

/// Validates a repository name: `^[A-Za-z0-9._-]+$`, no `..`, no leading or
/// trailing `.`.
#[must_use]
pub fn is_valid_repo_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with('.') || name.ends_with('.') {
        return false;
    }
    if name.contains("..") {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_traversal_attempts() {
        let root = Path::new("/srv/knot");
        for bad in ["..", "../x", "x/../..", "/abs", "a/../../b"] {
            assert!(secure_join(root, bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn accepts_plain_component() {
        let root = Path::new("/srv/knot");
        let joined = secure_join(root, "did:plc:abc").unwrap();
        assert_eq!(joined, Path::new("/srv/knot/did:plc:abc"));
    }

    #[test]
    fn rejects_empty_component() {
        assert!(secure_join(Path::new("/srv/knot"), "").is_err());
    }

    #[test]
    fn repo_name_validation() {
        assert!(is_valid_repo_name("my-repo_1.2"));
        assert!(!is_valid_repo_name(".hidden"));
        assert!(!is_valid_repo_name("trailing."));
        assert!(!is_valid_repo_name("a..b"));
        assert!(!is_valid_repo_name("has/slash"));
        assert!(!is_valid_repo_name(""));
    }

    proptest! {
        #[test]
        fn valid_names_never_contain_traversal(name in "[A-Za-z0-9_-]{1,40}") {
            prop_assert!(is_valid_repo_name(&name));
        }

        #[test]
        fn secure_join_never_escapes_root(component in "[^/\0]{0,30}") {
            let root = Path::new("/srv/knot");
            if let Ok(joined) = secure_join(root, &component) {
                prop_assert!(joined.starts_with(root));
            }
        }
    }
}
