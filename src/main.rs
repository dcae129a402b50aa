mod api;
mod chain;
mod config;
mod core;
mod db;
mod fraud;
mod metadata;
mod service;
mod store;
mod watchlist;

use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::chain::{DemoChain, EvmRpc, FUJI, NetworkPreset, RpcChain, TicketChain, TicketsContract};
use crate::config::Config;
use crate::db::SharedDatabase;
use crate::fraud::{FraudEngine, SharedFraudEngine};
use crate::metadata::TicketVerifier;
use crate::service::TicketService;
use crate::store::AppStore;

#[derive(Parser, Debug)]
#[command(name = "eventxx", about = "NFT event ticketing with fraud gating")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Listen address override, e.g. 127.0.0.1:8080.
    #[arg(long)]
    bind: Option<String>,

    /// Serve the built-in demo chain instead of connecting to an RPC endpoint.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("eventxx=info".parse().unwrap()),
        )
        .init();

    tracing::info!("🎫 EventXX starting...");

    // Load configuration
    let config = Config::load(&args.config);
    tracing::info!("Config: {:?}", config);

    // Open fraud audit database
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create database directory");
    }
    let db = SharedDatabase::open(db_path).expect("Failed to open fraud database");
    tracing::info!("Fraud database opened at {}", config.database.path);

    // Import watchlist entries from CSV if available
    if let Some(ref csv_path_str) = config.database.watchlist_csv {
        let csv_path = Path::new(csv_path_str);
        if csv_path.exists() {
            match db.load_watchlist_from_csv(csv_path) {
                Ok(count) => tracing::info!("Loaded {count} watchlist entries from CSV"),
                Err(e) => tracing::warn!("Failed to load watchlist CSV: {e}"),
            }
        }
    }

    // Seed the engine from the persisted watchlist
    let engine = SharedFraudEngine::new(FraudEngine::new(&config.fraud));
    match db.watchlist_entries() {
        Ok(entries) => {
            let (blocked, trusted) = watchlist::hydrate_engine(&engine, &entries);
            tracing::info!("Watchlist hydrated: {blocked} blocked, {trusted} trusted");
        }
        Err(e) => tracing::warn!("Failed to read watchlist entries: {e}"),
    }

    // Pick the chain backend
    let chain = connect_chain(&args, &config).await;

    let service = TicketService::new(chain, engine.clone(), db.clone(), &config);
    let store = AppStore::new(service, &config.store);
    let state = AppState {
        store,
        engine,
        db,
        verifier: Arc::new(Mutex::new(TicketVerifier::new())),
    };

    let bind = args.bind.unwrap_or_else(|| config.api.bind.clone());
    api::serve(state, &bind).await.expect("API server failed");
}

/// Connect to the configured network, falling back to the demo chain when no
/// endpoint answers.
async fn connect_chain(args: &Args, config: &Config) -> Arc<dyn TicketChain> {
    if args.demo {
        tracing::info!("Demo chain selected");
        return Arc::new(DemoChain::new());
    }

    let preset = NetworkPreset::by_name(&config.network.chain).unwrap_or(&FUJI);
    let urls: Vec<String> = if config.network.rpc_urls.is_empty() {
        preset.rpc_urls.iter().map(|url| url.to_string()).collect()
    } else {
        config.network.rpc_urls.clone()
    };
    let address = config
        .network
        .contract_address
        .as_deref()
        .unwrap_or(preset.contract_address);

    let contract = match TicketsContract::new(address) {
        Ok(contract) => contract,
        Err(e) => {
            tracing::warn!("Bad contract address {address}: {e}; using demo chain");
            return Arc::new(DemoChain::new());
        }
    };

    match EvmRpc::connect(&urls, config.network.max_retries).await {
        Ok(rpc) => {
            tracing::info!("Connected to {} via {}", preset.name, rpc.url());
            Arc::new(RpcChain::new(rpc, contract, config.network.log_scan_blocks))
        }
        Err(e) => {
            tracing::warn!("Chain connection failed: {e}; using demo chain");
            Arc::new(DemoChain::new())
        }
    }
}
