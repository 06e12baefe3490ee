//! Top-level orchestrator: tracks the wanted-DID set, computes the target
//! sharding, diffs it against the running workers, and cancels/starts under
//! a single rebalance lock so worker startup never blocks on that lock.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use knot_store::Store;

use crate::rebalance::{self, RebalancePlan};
use crate::router::{KeyFetcher, MessageRouter, RepoLocator};
use crate::sharding;
use crate::worker::Worker;

struct RunningWorker {
    dids: Vec<String>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the firehose worker fleet for one jetstream endpoint.
pub struct Ingester<L, K> {
    endpoint: String,
    store: Store,
    router: Arc<MessageRouter<L, K>>,
    workers: Mutex<Vec<RunningWorker>>,
}

impl<L, K> Ingester<L, K>
where
    L: RepoLocator + 'static,
    K: KeyFetcher + 'static,
{
    pub fn new(endpoint: String, store: Store, router: Arc<MessageRouter<L, K>>) -> Self {
        Self {
            endpoint,
            store,
            router,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Recomputes sharding for `wanted` and applies the resulting
    /// [`RebalancePlan`]. Safe to call repeatedly as the wanted-DID set
    /// grows (new knot-member admissions) or shrinks (none currently, but
    /// the diff handles it regardless).
    pub fn rebalance(self: &Arc<Self>, wanted: &[String]) {
        let targets = sharding::compute_targets(wanted);
        let mut workers = self.workers.lock();
        let current: Vec<Vec<String>> = workers.iter().map(|w| w.dids.clone()).collect();
        let plan = rebalance::diff_from_current(&current, &targets);
        self.apply_plan(&mut workers, plan);
    }

    fn apply_plan(self: &Arc<Self>, workers: &mut Vec<RunningWorker>, plan: RebalancePlan) {
        for &idx in plan.cancel.iter().rev() {
            if idx < workers.len() {
                let removed = workers.remove(idx);
                removed.cancel.cancel();
                info!(dids = removed.dids.len(), "cancelled firehose worker");
            }
        }
        for dids in plan.start {
            self.spawn_worker(workers, dids);
        }
    }

    fn spawn_worker(self: &Arc<Self>, workers: &mut Vec<RunningWorker>, dids: Vec<String>) {
        let cancel = CancellationToken::new();
        let worker = Worker::new(
            self.endpoint.clone(),
            dids.clone(),
            self.store.clone(),
            self.router.clone(),
            cancel.clone(),
        );
        info!(dids = dids.len(), "starting firehose worker");
        let handle = tokio::spawn(worker.run());
        workers.push(RunningWorker { dids, cancel, handle });
    }

    /// Cancels every worker and waits for them to finish persisting their
    /// cursor -- called on graceful shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<(CancellationToken, JoinHandle<()>)> = {
            let mut workers = self.workers.lock();
            workers
                .drain(..)
                .map(|w| (w.cancel, w.handle))
                .collect()
        };
        for (cancel, handle) in handles {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knot_auth::Enforcer as AuthEnforcer;
    use knot_git::Caches;

    struct NoRepos;
    impl RepoLocator for NoRepos {
        fn repo_path(&self, _repo_at_uri: &str) -> Option<std::path::PathBuf> {
            None
        }
    }
    struct NoKeys;
    #[async_trait::async_trait]
    impl KeyFetcher for NoKeys {
        async fn fetch_keys(&self, _did: &str) -> crate::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    async fn ingester() -> Arc<Ingester<NoRepos, NoKeys>> {
        let store = Store::open_in_memory().await.unwrap();
        let enforcer = AuthEnforcer::new(store.clone());
        let router = Arc::new(MessageRouter::new(
            store.clone(),
            enforcer,
            "knot.example".to_string(),
            Arc::new(Caches::new()),
            NoRepos,
            NoKeys,
        ));
        Arc::new(Ingester::new(
            "ws://jetstream.example/subscribe".to_string(),
            store,
            router,
        ))
    }

    #[tokio::test]
    async fn rebalance_from_empty_starts_one_worker_per_shard() {
        let ing = ingester().await;
        let wanted: Vec<String> = (0..150).map(|i| format!("did:plc:{i:04}")).collect();
        ing.rebalance(&wanted);
        assert_eq!(ing.worker_count(), 2);
        ing.shutdown().await;
    }

    #[tokio::test]
    async fn rebalance_is_a_noop_when_the_wanted_set_is_unchanged() {
        let ing = ingester().await;
        let wanted: Vec<String> = (0..10).map(|i| format!("did:plc:{i:04}")).collect();
        ing.rebalance(&wanted);
        ing.rebalance(&wanted);
        assert_eq!(ing.worker_count(), 1);
        ing.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_every_worker() {
        let ing = ingester().await;
        let wanted: Vec<String> = (0..10).map(|i| format!("did:plc:{i:04}")).collect();
        ing.rebalance(&wanted);
        ing.shutdown().await;
        assert_eq!(ing.worker_count(), 0);
    }
}
