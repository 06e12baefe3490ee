//! Component-scoped caches, injected into [`crate::GitEngine`] at
//! construction rather than hidden behind a global. Cache-miss and
//! cache-hit paths are both observable: callers can check `len()` before
//! and after a call in tests.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::commits::CommitInfo;

const LAST_COMMIT_CACHE_SIZE: usize = 4096;
const MERGE_CHECK_CACHE_SIZE: usize = 512;
const MERGE_CHECK_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Key into the last-commit cache: `(repo_path, head_hash, entry_path)`.
type LastCommitKey = (String, String, String);

/// Key into the merge-check cache: `(repo_path, head_hash, patch digest,
/// target branch)`.
type MergeCheckKey = (String, String, String, String);

/// The merge-check cache cannot store `None`, so a clean result is kept as
/// an explicit sentinel distinct from "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeCheckOutcome {
    Clean,
    Conflicted(Vec<crate::error::Conflict>),
}

struct TtlEntry<T> {
    value: T,
    inserted_at: Instant,
}

/// Shared, size-bounded caches for expensive repeated Git queries.
pub struct Caches {
    last_commit: Mutex<LruCache<LastCommitKey, CommitInfo>>,
    merge_check: Mutex<LruCache<MergeCheckKey, TtlEntry<MergeCheckOutcome>>>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            last_commit: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(LAST_COMMIT_CACHE_SIZE).unwrap(),
            )),
            merge_check: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(MERGE_CHECK_CACHE_SIZE).unwrap(),
            )),
        }
    }

    pub fn last_commit_get(&self, key: &LastCommitKey) -> Option<CommitInfo> {
        self.last_commit.lock().get(key).cloned()
    }

    pub fn last_commit_put(&self, key: LastCommitKey, value: CommitInfo) {
        self.last_commit.lock().put(key, value);
    }

    /// Number of entries currently cached, for test observability.
    pub fn last_commit_len(&self) -> usize {
        self.last_commit.lock().len()
    }

    pub fn merge_check_get(&self, key: &MergeCheckKey) -> Option<MergeCheckOutcome> {
        let mut cache = self.merge_check.lock();
        let expired = cache
            .peek(key)
            .is_some_and(|entry| entry.inserted_at.elapsed() > MERGE_CHECK_TTL);
        if expired {
            cache.pop(key);
            return None;
        }
        cache.get(key).map(|entry| entry.value.clone())
    }

    pub fn merge_check_put(&self, key: MergeCheckKey, value: MergeCheckOutcome) {
        self.merge_check.lock().put(
            key,
            TtlEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn merge_check_len(&self) -> usize {
        self.merge_check.lock().len()
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Caches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caches")
            .field("last_commit_len", &self.last_commit_len())
            .field("merge_check_len", &self.merge_check_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_commit_cache_round_trips() {
        let caches = Caches::new();
        let key = ("repo".into(), "head".into(), "path".into());
        assert!(caches.last_commit_get(&key).is_none());

        let commit = CommitInfo {
            sha: "abc".into(),
            author_name: "a".into(),
            author_email: "a@b.c".into(),
            message: "m".into(),
            time_us: 0,
            change_id: None,
        };
        caches.last_commit_put(key.clone(), commit.clone());
        assert_eq!(caches.last_commit_get(&key), Some(commit));
        assert_eq!(caches.last_commit_len(), 1);
    }

    #[test]
    fn merge_check_cache_does_not_grow_on_repeated_hit() {
        let caches = Caches::new();
        let key = ("repo".into(), "head".into(), "digest".into(), "main".into());
        caches.merge_check_put(key.clone(), MergeCheckOutcome::Clean);
        assert_eq!(caches.merge_check_len(), 1);

        assert_eq!(caches.merge_check_get(&key), Some(MergeCheckOutcome::Clean));
        assert_eq!(caches.merge_check_get(&key), Some(MergeCheckOutcome::Clean));
        assert_eq!(caches.merge_check_len(), 1);
    }
}
