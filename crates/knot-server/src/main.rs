//! `knot-server` -- wires the store, RBAC enforcer, git engine caches,
//! event notifier, firehose ingester, and the two HTTP routers together,
//! then runs until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knot_auth::{Enforcer, ROLE_SERVER_MEMBER};
use knot_firehose::{Ingester, MessageRouter};
use knot_git::Caches;
use knot_realtime::Notifier;
use knot_rpc::{AppState, AppviewKeyResolver, KnotConfig, RpcState};
use knot_store::Store;

mod config;
mod hooks;
mod wiring;

use config::Config;
use wiring::{AppviewKeyFetcher, ScanRootRepoLocator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("knot_server={0},knot_rpc={0},knot_firehose={0}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting knot-server");

    let store = Store::open(&config.db_path).await?;
    let enforcer = Enforcer::new(store.clone());
    enforcer.add_knot(&config.hostname).await?;
    enforcer.add_knot_owner(&config.owner_did, &config.hostname).await?;

    let caches = Arc::new(Caches::new());
    let notifier = Arc::new(Notifier::new());
    let rpc_config = KnotConfig {
        hostname: config.hostname.clone(),
        owner_did: config.owner_did.clone(),
        scan_root: config.repo_scan_path.clone(),
        main_branch: config.repo_main_branch.clone(),
        readme_names: config.repo_readme_names.clone(),
    };
    let app_state = AppState {
        store: store.clone(),
        enforcer: enforcer.clone(),
        caches: caches.clone(),
        notifier: notifier.clone(),
        config: Arc::new(rpc_config),
    };
    let rpc_state = RpcState {
        app: app_state.clone(),
        key_resolver: Arc::new(AppviewKeyResolver::new(config.appview_endpoint.clone())),
    };

    let router = Arc::new(MessageRouter::new(
        store.clone(),
        enforcer.clone(),
        config.hostname.clone(),
        caches.clone(),
        ScanRootRepoLocator::new(config.repo_scan_path.clone()),
        AppviewKeyFetcher::new(config.appview_endpoint.clone()),
    ));
    let ingester = Arc::new(Ingester::new(config.jetstream_endpoint.clone(), store.clone(), router));
    let wanted = known_dids(&enforcer, &store, &config.hostname).await?;
    ingester.rebalance(&wanted);

    if let Err(e) = hooks::install_all(&config.repo_scan_path, &config.hook_binary_path, &internal_api_url(&config)) {
        tracing::warn!(error = %e, "hook installation bootstrap failed");
    }

    let public_listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let public_addr = config.listen_addr;
    let public_task = tokio::spawn(async move {
        tracing::info!(addr = %public_addr, "public HTTP listening");
        if let Err(e) = axum::serve(public_listener, knot_rpc::public_router(rpc_state)).await {
            tracing::error!(error = %e, "public HTTP server exited");
        }
    });

    let internal_listener = tokio::net::TcpListener::bind(config.internal_listen_addr).await?;
    let internal_addr = config.internal_listen_addr;
    let internal_task = tokio::spawn(async move {
        tracing::info!(addr = %internal_addr, "internal HTTP listening");
        if let Err(e) = axum::serve(internal_listener, knot_rpc::internal_router(app_state)).await {
            tracing::error!(error = %e, "internal HTTP server exited");
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining firehose workers");

    ingester.shutdown().await;
    public_task.abort();
    internal_task.abort();

    Ok(())
}

async fn known_dids(enforcer: &Enforcer, store: &Store, domain: &str) -> anyhow::Result<Vec<String>> {
    let mut dids = store.list_known_dids().await?.into_iter().map(|d| d.as_str().to_string()).collect::<Vec<_>>();
    for member in enforcer.get_users_by_role(domain, ROLE_SERVER_MEMBER).await.unwrap_or_default() {
        if !dids.contains(&member) {
            dids.push(member);
        }
    }
    Ok(dids)
}

fn internal_api_url(config: &Config) -> String {
    format!("http://{}", config.internal_listen_addr)
}

/// Waits for any of the signals the ingester is expected to persist its
/// cursor on: SIGINT, SIGTERM, SIGQUIT, SIGHUP (plus Ctrl+C on platforms
/// without Unix signals).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
    let mut hup = signal(SignalKind::hangup()).expect("install SIGHUP handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = term.recv() => {},
        _ = quit.recv() => {},
        _ = hup.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
