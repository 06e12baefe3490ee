//! Shared state injected into every route via axum's `State` extractor.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;

use knot_auth::Enforcer;
use knot_git::Caches;
use knot_realtime::Notifier;
use knot_store::Store;

use crate::service_auth::ServiceAuthKeyResolver;

/// Static configuration the handlers need but that never changes after
/// startup.
#[derive(Debug, Clone)]
pub struct KnotConfig {
    pub hostname: String,
    pub owner_did: String,
    pub scan_root: PathBuf,
    pub main_branch: String,
    pub readme_names: Vec<String>,
}

/// Cloneable handle shared across both the public and internal routers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub enforcer: Enforcer,
    pub caches: Arc<Caches>,
    pub notifier: Arc<Notifier>,
    pub config: Arc<KnotConfig>,
}

impl AppState {
    pub fn new(store: Store, enforcer: Enforcer, notifier: Arc<Notifier>, config: KnotConfig) -> Self {
        Self {
            store,
            enforcer,
            caches: Arc::new(Caches::new()),
            notifier,
            config: Arc::new(config),
        }
    }

    /// The on-disk path of `<did>/<name>`, secure-joined against the scan
    /// root so a malformed path component can never escape it.
    pub fn repo_path(&self, did: &str, name: &str) -> knot_core::Result<PathBuf> {
        let joined = knot_core::secure_join_all(&self.config.scan_root, &[did, name])?;
        Ok(joined)
    }
}

/// The full axum router state: [`AppState`] plus the pluggable ServiceAuth
/// key resolver, combined so both can be extracted independently.
#[derive(Clone)]
pub struct RpcState {
    pub app: AppState,
    pub key_resolver: Arc<dyn ServiceAuthKeyResolver>,
}

impl FromRef<RpcState> for AppState {
    fn from_ref(state: &RpcState) -> Self {
        state.app.clone()
    }
}

impl FromRef<RpcState> for Arc<dyn ServiceAuthKeyResolver> {
    fn from_ref(state: &RpcState) -> Self {
        state.key_resolver.clone()
    }
}
