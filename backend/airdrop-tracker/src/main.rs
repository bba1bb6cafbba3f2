//! Airdrop tracker — entry point.
//!
//! Reads the operator's `address,balance` list, verifies the operator owns the
//! airdrop contract and that its balance covers the list, then submits the
//! list in fixed-size batches through the JSON-RPC node, one transaction in
//! flight at a time. A small Axum REST API reports per-recipient status.

mod abi;
mod api;
mod config;
mod db;
mod entry;
mod errors;
mod planner;
mod preflight;
mod projector;
mod rpc;
mod stake;
mod tracker;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use rpc::{AirdropChain, EthRpc};
use stake::StakeTable;
use tracker::{SubmissionTracker, TrackerTask};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let text = std::fs::read_to_string(&config.input_path)?;
    let entries = entry::parse_entries(&text)?;
    let required = entry::total_amount(&entries)?;
    info!(
        "Loaded {} airdrop entries totalling {required} from {}",
        entries.len(),
        config.input_path.display()
    );

    let stake_table = match &config.stake_programs_file {
        Some(path) => StakeTable::from_file(path)?,
        None => StakeTable::default(),
    };

    let pool = db::init_pool(&config.database_url).await?;

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let chain: Arc<dyn AirdropChain> = Arc::new(EthRpc::new(
        client,
        config.rpc_url.clone(),
        config.airdrop_contract,
        config.operator,
    ));

    let batches = planner::plan(&entries, config.batch_capacity);
    let tracker = SubmissionTracker::resume(chain.clone(), pool, batches).await?;

    // A resumed run has already spent part of the balance, so only check it
    // on a fresh start.
    if tracker.handle().snapshot().submitted.is_empty() {
        preflight::check(chain.as_ref(), config.operator, required).await?;
    }
    info!(
        "Planned {} batches of up to {} recipients",
        tracker.batches().len(),
        config.batch_capacity
    );

    // ─── Background tracker ───────────────────────────────
    let api_state = Arc::new(api::ApiState {
        entries,
        tracker: tracker.handle(),
        stake_table,
    });
    let shutdown = CancellationToken::new();
    let task = TrackerTask::spawn(
        tracker,
        Duration::from_secs(config.poll_interval_secs),
        shutdown.child_token(),
    );

    // ─── REST API ─────────────────────────────────────────
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/airdrop/rows", get(api::get_rows))
        .route("/airdrop/batches", get(api::get_batches))
        .route("/airdrop/retry", post(api::retry))
        .route("/stake/quote", get(api::stake_quote))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    task.stop().await;
    Ok(())
}
