//! # CLI Interface
//!
//! Defines the command-line argument structure for `storj-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.
//!
//! Address and port arguments default to sane loopback values. Every
//! configurable value has a corresponding environment variable for
//! container-friendly deployment — because nobody wants to pass 10 flags
//! to a Docker entrypoint. Directory arguments run through
//! [`expand_home`] at parse time, so `~/.storjnode` works even where no
//! shell expanded it (env vars, systemd units, Docker).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// STORJ shard-storage network node.
///
/// A peer for the content-addressed shard-storage network: rents out
/// disk to other peers, stores and retrieves shards, and answers
/// Merkle-tree possession audits.
#[derive(Parser, Debug)]
#[command(
    name = "storj-node",
    about = "STORJ shard-storage network node",
    version,
    propagate_version = true
)]
pub struct StorjNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and generates
    /// a fresh secp256k1 keypair.
    Init(InitArgs),
    /// Query the status of a running node via its RPC endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the node data directory where shards, items, and the key
    /// file are stored. Created on first run if it does not exist.
    #[arg(
        long,
        short = 'd',
        env = "STORJ_DATA_DIR",
        default_value = "~/.storjnode",
        value_parser = expand_home
    )]
    pub data_dir: PathBuf,

    /// Bind address for the signed JSON-RPC endpoint.
    #[arg(long, env = "STORJ_RPC_BIND", default_value = "127.0.0.1:4000")]
    pub rpc_bind: String,

    /// Bind address for the Prometheus metrics endpoint.
    #[arg(long, env = "STORJ_METRICS_BIND", default_value = "127.0.0.1:4001")]
    pub metrics_bind: String,

    /// Hostname or IP other peers should use to reach this node. The
    /// advertised port is taken from --rpc-bind.
    #[arg(long, env = "STORJ_ADVERTISE_HOST", default_value = "127.0.0.1")]
    pub advertise_host: String,

    /// Seed contact URIs (storj://host:port/<nodeIdHex>). Repeatable.
    #[arg(long = "seed")]
    pub seeds: Vec<String>,

    /// Disable farming: the node will not subscribe to the contract
    /// topic or offer storage. Renter-only operation.
    #[arg(long)]
    pub no_farm: bool,

    /// Log verbosity level: trace, debug, info, warn, error.
    #[arg(long, env = "STORJ_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "STORJ_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Hex-encoded secp256k1 secret key. If not provided, the node reads
    /// (or generates) the key file in the data directory.
    /// **Never pass this flag in production** — use the key file instead.
    #[arg(long, env = "STORJ_NODE_KEY")]
    pub node_key: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(
        long,
        short = 'd',
        env = "STORJ_DATA_DIR",
        default_value = "~/.storjnode",
        value_parser = expand_home
    )]
    pub data_dir: PathBuf,

    /// Overwrite an existing key file. Use with caution — this discards
    /// the node's identity along with every contract bound to it.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    /// host:port of the running node's RPC endpoint.
    #[arg(long, default_value = "127.0.0.1:4000")]
    pub rpc_addr: String,
}

/// clap value parser for directory arguments: a leading `~` becomes the
/// user's home directory (`HOME`, or `USERPROFILE` on Windows). Paths
/// without the prefix pass through untouched.
pub fn expand_home(raw: &str) -> Result<PathBuf, String> {
    let Some(rest) = raw.strip_prefix('~') else {
        return Ok(PathBuf::from(raw));
    };

    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let home = std::env::var_os(var)
        .ok_or_else(|| format!("cannot expand '~': {var} is not set in the environment"))?;
    Ok(PathBuf::from(home).join(rest.trim_start_matches(['/', '\\'])))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
