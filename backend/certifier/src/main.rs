//! Diploma certifier: entry point.
//!
//! Wires the JSON-RPC ledger and the IPFS store into the certifier, starts
//! the event watcher and caller tracking in the background, and serves the
//! REST API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use certifier::api::{self, ApiState};
use certifier::caller::{self, WalletSession};
use certifier::config::Config;
use certifier::rpc::{EthRpc, JsonRpcLedger};
use certifier::store::IpfsStore;
use certifier::watcher::{self, WatcherState};
use certifier::Certifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Optional .env file.
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let rpc = Arc::new(EthRpc::new(client.clone(), config.rpc_url.clone()));
    let ledger = Arc::new(JsonRpcLedger::new(
        Arc::clone(&rpc),
        config.contract_address,
        config.receipt_poll_interval(),
    ));
    let store = Arc::new(IpfsStore::new(
        client,
        config.ipfs_api_url.clone(),
        config.ipfs_gateway_url.clone(),
    ));
    let certifier = Certifier::new(ledger, store);
    let cancel = CancellationToken::new();

    // ─── Event watcher ────────────────────────────────────
    let (events, _) = broadcast::channel(64);
    let watcher_state = Arc::new(WatcherState {
        rpc: Arc::clone(&rpc),
        contract: config.contract_address,
        start_block: config.start_block,
        poll_interval: config.poll_interval(),
        events: events.clone(),
    });
    let watcher_task = tokio::spawn(watcher::run(watcher_state, cancel.clone()));

    // ─── Caller tracking ──────────────────────────────────
    let session = Arc::new(WalletSession::new(config.caller_address));
    let (status_tx, status_rx) = watch::channel(None);
    tokio::spawn(caller::track_accounts(
        Arc::clone(&session),
        rpc,
        config.caller_address,
        config.poll_interval(),
        cancel.clone(),
    ));
    tokio::spawn(caller::track_roles(
        Arc::clone(&session),
        certifier.resolver(),
        events.subscribe(),
        status_tx,
        cancel.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(ApiState {
        certifier,
        session,
        status: status_rx,
    }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C, running until killed: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let _ = watcher_task.await;
    Ok(())
}
