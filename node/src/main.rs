// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # STORJ Node
//!
//! Entry point for the `storj-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the storage layers, joins the
//! network, and serves the signed JSON-RPC endpoint.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — initialize the data directory and generate a keypair
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use storj_protocol::contact::ContactBook;
use storj_protocol::crypto::KeyPair;
use storj_protocol::message::MessageAuth;
use storj_protocol::network::http::HttpTransport;
use storj_protocol::network::node::{NetworkStack, NodeOptions};
use storj_protocol::network::overlay::StaticOverlay;
use storj_protocol::network::topics::GossipTopics;
use storj_protocol::network::{Overlay, Topics, Transport};
use storj_protocol::storage::{ItemStore, SledShardStore};
use storj_protocol::{Contact, Identity, Node};

use cli::{Commands, StorjNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Name of the hex-encoded secret key file inside the data directory.
const KEY_FILE: &str = "node.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = StorjNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full node: storage, network stack, RPC server, and
/// metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let level = &args.log_level;
    logging::init(
        &format!("storj_node={level},storj_protocol={level},tower_http=warn"),
        args.log_format,
    );

    let data_dir = args.data_dir.clone();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    // --- Identity ---
    let keypair = match &args.node_key {
        Some(hex_key) => KeyPair::from_hex(hex_key)
            .map_err(|e| anyhow!("invalid --node-key value: {e}"))?,
        None => load_or_generate_key(&data_dir)?,
    };
    let identity = Identity::new(keypair);
    tracing::info!(
        node_id = %identity.node_id(),
        address = %identity.address(),
        "node identity loaded"
    );

    // --- Contact & seeds ---
    let rpc_addr: SocketAddr = args
        .rpc_bind
        .parse()
        .with_context(|| format!("invalid --rpc-bind address: {}", args.rpc_bind))?;
    let contact = Contact::new(args.advertise_host.clone(), rpc_addr.port(), identity.node_id());

    let seeds: Vec<Contact> = args
        .seeds
        .iter()
        .map(|uri| {
            uri.parse()
                .map_err(|e| anyhow!("invalid seed uri {uri}: {e}"))
        })
        .collect::<Result<_>>()?;

    // --- Storage ---
    let shards = Arc::new(
        SledShardStore::open(data_dir.join("shards"))
            .with_context(|| format!("failed to open shard store under {}", data_dir.display()))?,
    );
    let items = ItemStore::open(&data_dir)
        .with_context(|| format!("failed to open item store under {}", data_dir.display()))?;

    // --- Network stack ---
    let book = Arc::new(ContactBook::new());
    let auth = Arc::new(MessageAuth::new(identity.clone(), Arc::clone(&book)));
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());
    let overlay: Arc<dyn Overlay> = Arc::new(StaticOverlay::new(
        Arc::clone(&auth),
        Arc::clone(&transport),
        Arc::clone(&book),
        contact.clone(),
    ));
    let topics: Arc<dyn Topics> = Arc::new(GossipTopics::new(
        Arc::clone(&auth),
        Arc::clone(&transport),
        Arc::clone(&book),
        contact.clone(),
    ));

    let node = Node::new(
        identity,
        contact.clone(),
        NodeOptions {
            farm: !args.no_farm,
            seeds,
        },
        auth,
        book,
        NetworkStack {
            overlay,
            topics,
            transport,
        },
        shards,
        items,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Servers ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        node: node.clone(),
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_listener = tokio::net::TcpListener::bind(&args.rpc_bind)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", args.rpc_bind))?;
    tracing::info!("RPC endpoint listening on {} ({})", args.rpc_bind, contact.to_uri());

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_bind)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_bind))?;
    tracing::info!("metrics listening on {}", args.metrics_bind);

    // --- Join ---
    node.join().await?;

    // Keep the gauges warm between scrapes.
    let refresh = tokio::spawn({
        let node = node.clone();
        let node_metrics = Arc::clone(&node_metrics);
        async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                node_metrics.refresh_from(&node);
            }
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("RPC server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        signal = shutdown_signal() => {
            tracing::info!(signal, "shutdown signal received, leaving network");
        }
    }

    refresh.abort();
    node.leave().await.ok();
    tracing::info!("storj-node stopped");
    Ok(())
}

/// Initializes a new node data directory and generates a keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init("storj_node=info", LogFormat::Pretty);

    let data_dir = args.data_dir;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() && !args.force {
        return Err(anyhow!(
            "key file already exists at {} (pass --force to overwrite and discard the identity)",
            key_path.display()
        ));
    }

    let keypair = KeyPair::generate();
    write_key_file(&key_path, &keypair)?;
    let identity = Identity::new(keypair);

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Key file       : {}", key_path.display());
    println!("  Node ID        : {}", identity.node_id());
    println!("  Address        : {}", identity.address());
    println!(
        "  Seed URI       : storj://<host>:4000/{}",
        identity.node_id()
    );

    Ok(())
}

/// Queries a running node's `/status` endpoint and prints the body.
///
/// Deliberately a raw HTTP/1.1 exchange over a TCP stream — pulling a
/// whole HTTP client into the binary for one GET would be silly.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (host, _port) = args
        .rpc_addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("--rpc-addr must be host:port"))?;

    let mut stream = tokio::net::TcpStream::connect(&args.rpc_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.rpc_addr))?;

    let request = format!("GET /status HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
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
    println!("{}", body.trim());
    Ok(())
}

/// Loads the key file from the data directory, generating one on first
/// run.
fn load_or_generate_key(data_dir: &Path) -> Result<KeyPair> {
    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() {
        let hex_key = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read key file {}", key_path.display()))?;
        return KeyPair::from_hex(&hex_key)
            .map_err(|e| anyhow!("invalid key file {}: {e}", key_path.display()));
    }

    let keypair = KeyPair::generate();
    write_key_file(&key_path, &keypair)?;
    tracing::info!(key_path = %key_path.display(), "generated fresh node keypair");
    Ok(keypair)
}

/// Writes the hex-encoded secret key, owner-readable only on Unix.
fn write_key_file(key_path: &Path, keypair: &KeyPair) -> Result<()> {
    std::fs::write(key_path, hex::encode(keypair.secret_bytes()))
        .with_context(|| format!("failed to write key file {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("storj-node {}", env!("CARGO_PKG_VERSION"));
}

/// Resolves when the process is asked to stop, naming the signal that
/// fired so the shutdown log line says why the node is leaving.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler installs");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

/// Ctrl+C is the only stop signal off Unix.
#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    tokio::signal::ctrl_c()
        .await
        .expect("Ctrl+C handler installs");
    "ctrl-c"
}
