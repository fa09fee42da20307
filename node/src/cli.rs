//! # CLI Interface
//!
//! Defines the command-line argument structure for `cashier-node` using
//! `clap` derive. Every flag that matters in a deployment can also come
//! from a `CASHIER_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cashier relay node.
///
/// Hosts a Cashier ledger, relays holder-signed instructions to it under
/// the node's own proof of work, and serves balances, credentials and the
/// event journal over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "cashier-node",
    about = "Cashier relay node",
    version,
    propagate_version = true
)]
pub struct CashierNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Cashier node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a data directory: default config, relay key, genesis ledger.
    Init(InitArgs),
    /// Start the relay node.
    Run(RunArgs),
    /// Print a fresh secp256k1 secret key and its account id.
    Keygen,
    /// Search for a relay nonce that clears a difficulty.
    SolvePow(SolvePowArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CASHIER_DATA_DIR", default_value = "./cashier-data")]
    pub data_dir: PathBuf,

    /// Start from this config file instead of the devnet defaults. It is
    /// copied into the data directory.
    #[arg(long, short = 'c', env = "CASHIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hex-encoded relay secret key. A fresh one is generated when omitted.
    #[arg(long, env = "CASHIER_RELAY_KEY")]
    pub relay_key: Option<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "CASHIER_DATA_DIR", default_value = "./cashier-data")]
    pub data_dir: PathBuf,

    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node reads `cashier.toml` in the data directory.
    #[arg(long, short = 'c', env = "CASHIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured API port.
    #[arg(long, env = "CASHIER_API_PORT")]
    pub api_port: Option<u16>,

    /// Override the configured metrics port.
    #[arg(long, env = "CASHIER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log format: `pretty` or `json`. Overrides the config file.
    #[arg(long, env = "CASHIER_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Arguments for the `solve-pow` subcommand.
#[derive(Parser, Debug)]
pub struct SolvePowArgs {
    /// Relay account id (`0x` + 40 hex chars).
    #[arg(long)]
    pub relay: String,

    /// Required leading zero bytes.
    #[arg(long, default_value_t = cashier_protocol::config::DEFAULT_LEADING_ZERO_BYTES)]
    pub difficulty: u8,

    /// First nonce to try.
    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// Give up after this many attempts.
    #[arg(long, default_value_t = cashier_protocol::config::DEFAULT_POW_SEARCH_LIMIT)]
    pub max_attempts: u64,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, env = "CASHIER_API_URL", default_value = "http://127.0.0.1:9741")]
    pub api_url: String,
}
