//! Pure sharding math: `N = ceil(|wanted_dids| / 100)` workers, each bound
//! to a contiguous slice of the sorted wanted-DID set.

/// Maximum DIDs a single worker subscribes to.
pub const MAX_DIDS_PER_WORKER: usize = 100;

/// Splits `wanted` (already deduplicated) into `ceil(n / 100)` contiguous
/// slices, sorted so the same input always produces the same sharding --
/// stable shard assignment matters because `compute_targets` diffs against
/// the previous sharding by index.
pub fn compute_targets(wanted: &[String]) -> Vec<Vec<String>> {
    if wanted.is_empty() {
        return Vec::new();
    }
    let mut sorted = wanted.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
        .chunks(MAX_DIDS_PER_WORKER)
        .map(|chunk| chunk.to_vec())
        .collect()
}
