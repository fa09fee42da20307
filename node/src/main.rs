// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cashier Relay Node
//!
//! Entry point for the `cashier-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the ledger from disk, and serves
//! the relay API.
//!
//! The binary supports six subcommands:
//!
//! - `init`     : create a data directory, relay key and genesis ledger
//! - `run`      : start the relay node
//! - `keygen`   : print a fresh secp256k1 key
//! - `solve-pow`: search a relay nonce offline
//! - `status`   : query a running node's status endpoint
//! - `version`  : print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod service;
mod store;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use cashier_contracts::SystemClock;
use cashier_protocol::crypto::CashierKeypair;
use cashier_protocol::types::AccountId;
use cashier_protocol::work::{solve_work, work_digest};

use cli::{CashierNodeCli, Commands};
use config::{NodeConfig, CONFIG_FILE_NAME};
use logging::{LogFormat, DEFAULT_FILTER};
use metrics::NodeMetrics;
use service::RelayService;
use store::LedgerStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CashierNodeCli::parse();

    match cli.command {
        Commands::Init(args) => init_node(args),
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::SolvePow(args) => solve_pow(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads the ledger and serves the API and metrics endpoints until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CONFIG_FILE_NAME));
    let mut config = NodeConfig::load(&config_path)?;
    if let Some(port) = args.api_port {
        config.node.api_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.node.metrics_port = port;
    }
    if let Some(format) = &args.log_format {
        config.node.log_format = LogFormat::from_str_lossy(format);
    }

    logging::init_logging(DEFAULT_FILTER, config.node.log_format);

    tracing::info!(
        api_port = config.node.api_port,
        metrics_port = config.node.metrics_port,
        data_dir = %config.node.data_dir.display(),
        "starting cashier-node"
    );

    // --- Persistent storage ---
    let db_path = config.db_path();
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    if !store.is_initialized()? {
        bail!(
            "no ledger in {}; run `cashier-node init` first",
            db_path.display()
        );
    }
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Relay identity ---
    let relay = read_relay_key(&config.relay_key_path())?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Ledger ---
    let service = RelayService::open(
        store,
        relay,
        Arc::new(SystemClock),
        config.node.pow_search_limit,
        Arc::clone(&node_metrics),
    )?;

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            cashier_protocol::config::PROTOCOL_VERSION,
        ),
        service: Arc::new(service),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", config.node.bind, config.node.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", config.node.bind, config.node.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("cashier-node stopped");
    Ok(())
}

/// Creates the data directory, writes the config and relay key, and
/// persists the genesis ledger.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(DEFAULT_FILTER, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::devnet(data_dir.clone()),
    };
    config.node.data_dir = data_dir.clone();
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let store = LedgerStore::open(config.db_path())
        .with_context(|| format!("failed to open database at {}", config.db_path().display()))?;
    if store.is_initialized()? {
        bail!("{} already holds a ledger", data_dir.display());
    }

    let relay = match &args.relay_key {
        Some(hex_key) => CashierKeypair::from_hex(hex_key.trim()).context("invalid relay key")?,
        None => CashierKeypair::generate(),
    };
    let key_path = config.relay_key_path();
    std::fs::write(&key_path, relay.to_hex())
        .with_context(|| format!("failed to write relay key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let (ledger, events) = service::genesis_ledger(&config, Arc::new(SystemClock))
        .context("genesis configuration rejected")?;
    store.initialize(&ledger, events)?;

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    config.save(&config_path)?;

    tracing::info!(
        relay = %relay.account_id(),
        ledger = %config.ledger.address,
        allocations = config.genesis.allocations.len(),
        "genesis ledger persisted"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Relay key      : {}", key_path.display());
    println!("  Relay account  : {}", relay.account_id());
    println!("  Ledger         : {}", config.ledger.address);

    Ok(())
}

fn read_relay_key(path: &Path) -> Result<CashierKeypair> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read relay key {}", path.display()))?;
    CashierKeypair::from_hex(text.trim())
        .with_context(|| format!("invalid relay key in {}", path.display()))
}

/// Prints a fresh secret key and the account it controls.
fn keygen() {
    let keypair = CashierKeypair::generate();
    println!("secret  {}", keypair.to_hex());
    println!("account {}", keypair.account_id());
}

/// Offline nonce search, for relays that are not this node.
fn solve_pow(args: cli::SolvePowArgs) -> Result<()> {
    let relay: AccountId = args
        .relay
        .parse()
        .with_context(|| format!("invalid relay account {:?}", args.relay))?;
    let nonce = solve_work(&relay, args.difficulty, args.start, args.max_attempts)?;
    println!("nonce  {}", nonce);
    println!("digest 0x{}", hex::encode(work_digest(&relay, nonce)));
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw tokio TCP stream. Plain `http://` only.
async fn http_get(url: &str) -> Result<String> {
    let parsed: url::Url = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let addr = format!("{}:{}", parsed.host, parsed.port.unwrap_or(80));
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        parsed.path, parsed.host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("cashier-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", cashier_protocol::config::PROTOCOL_VERSION);
    println!("signing      {}", cashier_protocol::config::SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Just enough URL parsing for `status`: host, port, path.
mod url {
    #[derive(Debug, PartialEq, Eq)]
    pub struct Url {
        pub host: String,
        pub port: Option<u16>,
        pub path: String,
    }

    impl std::str::FromStr for Url {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.starts_with("https://") {
                return Err("https is not supported".into());
            }
            let rest = s.strip_prefix("http://").unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err("missing host".into());
            }

            let (host, port) = match authority.rfind(':') {
                Some(i) => {
                    let p = authority[i + 1..]
                        .parse::<u16>()
                        .map_err(|e| format!("bad port: {}", e))?;
                    (authority[..i].to_string(), Some(p))
                }
                None => (authority.to_string(), None),
            };

            Ok(Url {
                host,
                port,
                path: path.to_string(),
            })
        }
    }

}
