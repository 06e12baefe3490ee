//! `compute_target -> diff_from_current -> cancel+start`: the rebalance
//! decision, kept as a pure function so it can be unit tested without any
//! actual worker tasks.

/// What the ingester should do to its worker set after a wanted-DID-set
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebalancePlan {
    /// Indices into the current worker vector to cancel (slice changed, or
    /// surplus).
    pub cancel: Vec<usize>,
    /// New DID slices to start workers for (slice changed, or deficit).
    pub start: Vec<Vec<String>>,
    /// Indices that are unchanged and should be left running.
    pub keep: Vec<usize>,
}

/// Diffs `current` worker slices against freshly computed `targets`.
/// Workers whose slice changed are cancelled and relaunched; surplus
/// workers (more current than target) are cancelled; deficit workers
/// (more target than current) are started.
pub fn diff_from_current(current: &[Vec<String>], targets: &[Vec<String>]) -> RebalancePlan {
    let mut plan = RebalancePlan::default();
    for i in 0..current.len().max(targets.len()) {
        match (current.get(i), targets.get(i)) {
            (Some(cur), Some(tgt)) if cur == tgt => plan.keep.push(i),
            (Some(_), Some(tgt)) => {
                plan.cancel.push(i);
                plan.start.push(tgt.clone());
            }
            (Some(_), None) => plan.cancel.push(i),
            (None, Some(tgt)) => plan.start.push(tgt.clone()),
            (None, None) => unreachable!(),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_change_keeps_every_worker() {
        let current = vec![slice(&["a", "b"])];
        let targets = vec![slice(&["a", "b"])];
        let plan = diff_from_current(&current, &targets);
        assert_eq!(plan.keep, vec![0]);
        assert!(plan.cancel.is_empty());
        assert!(plan.start.is_empty());
    }

    #[test]
    fn changed_slice_cancels_and_restarts_the_same_index() {
        let current = vec![slice(&["a", "b"])];
        let targets = vec![slice(&["a", "c"])];
        let plan = diff_from_current(&current, &targets);
        assert_eq!(plan.cancel, vec![0]);
        assert_eq!(plan.start, vec![slice(&["a", "c"])]);
    }

    #[test]
    fn surplus_workers_are_cancelled_without_replacement() {
        let current = vec![slice(&["a"]), slice(&["b"])];
        let targets = vec![slice(&["a"])];
        let plan = diff_from_current(&current, &targets);
        assert_eq!(plan.cancel, vec![1]);
        assert_eq!(plan.keep, vec![0]);
        assert!(plan.start.is_empty());
    }

    #[test]
    fn deficit_workers_are_started_without_cancelling_existing_ones() {
        let current = vec![slice(&["a"])];
        let targets = vec![slice(&["a"]), slice(&["b"])];
        let plan = diff_from_current(&current, &targets);
        assert_eq!(plan.keep, vec![0]);
        assert_eq!(plan.start, vec![slice(&["b"])]);
        assert!(plan.cancel.is_empty());
    }
}
