// Copyright (c) 2026 Conduit Contributors. MIT License.
// See LICENSE for details.

//! # Conduit Gateway Node
//!
//! Entry point for the `conduit-node` binary. Parses CLI arguments,
//! initializes logging and metrics, restores or bootstraps the gateway, and
//! serves the HTTP API.
//!
//! Subcommands:
//!
//! - `run`: start the gateway node
//! - `digest`: print the digest attestors sign for a redemption
//! - `check-config`: validate a config file
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;

use conduit_contracts::{handler_for_kind, LedgerBatchExecutor, HANDLER_KINDS};
use conduit_protocol::bridge::BridgeGateway;
use conduit_protocol::config::GatewayConfig;
use conduit_protocol::storage::ConduitDB;

use cli::{Commands, ConduitNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

const DEFAULT_LOG_FILTER: &str =
    "conduit_node=info,conduit_protocol=info,conduit_contracts=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ConduitNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Digest(args) => print_digest(args),
        Commands::CheckConfig(args) => check_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the gateway node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, args.log_format);

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        admin = args.admin_token.is_some(),
        "starting conduit-node"
    );

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = Arc::new(
        ConduitDB::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Gateway ---
    let mut gateway = load_gateway(&config, &db)?;
    let snapshot = gateway.snapshot();
    db.save_snapshot(&snapshot)
        .context("failed to persist initial gateway state")?;
    gateway.mark_persisted(&snapshot);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe_gateway(&gateway);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            conduit_protocol::config::PROTOCOL_VERSION,
        ),
        bridge: Arc::new(Mutex::new(api::Bridge::new(gateway))),
        db: Arc::clone(&db),
        metrics: Arc::clone(&node_metrics),
        admin_token: args.admin_token.map(Arc::from),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
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
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("conduit-node stopped");
    Ok(())
}

/// Restores the gateway from `db`, or bootstraps it from `config` when the
/// database is fresh. Persisted state takes precedence over the config.
fn load_gateway(config: &GatewayConfig, db: &ConduitDB) -> Result<BridgeGateway> {
    if let Some(snapshot) = db.load_snapshot().context("failed to read gateway state")? {
        if snapshot.network != config.network_id {
            bail!(
                "database belongs to network {} but config names {}",
                snapshot.network,
                config.network_id
            );
        }
        if snapshot.batcher != config.batcher {
            tracing::warn!(
                persisted = %snapshot.batcher,
                configured = %config.batcher,
                "ignoring configured batcher; using the persisted one"
            );
        }
        let batcher = LedgerBatchExecutor::new(snapshot.batcher, snapshot.network.clone());
        return BridgeGateway::restore(snapshot, handler_for_kind, Arc::new(batcher))
            .context("failed to restore gateway");
    }

    tracing::info!(network = %config.network_id, "bootstrapping gateway from config");
    let batcher = LedgerBatchExecutor::new(config.batcher, config.network_id.clone());
    let mut gateway = BridgeGateway::new(
        config.network_id.clone(),
        config.threshold as usize,
        config.dedup,
        Arc::new(batcher),
    )?;
    if !config.signers.is_empty() {
        gateway.add_signers(&config.signers)?;
    }
    for (asset_type, kind) in &config.handlers {
        let handler = handler_for_kind(kind).with_context(|| {
            format!(
                "asset type {asset_type}: unknown handler kind {kind:?} (known: {})",
                HANDLER_KINDS.join(", ")
            )
        })?;
        gateway.add_handler(*asset_type, handler)?;
    }
    if gateway.threshold() > gateway.signers().len() {
        tracing::warn!(
            threshold = gateway.threshold(),
            signers = gateway.signers().len(),
            "threshold exceeds signer count; redemptions will fail until signers are added"
        );
    }
    Ok(gateway)
}

/// Prints the operation digest for a redemption, for offline signing.
fn print_digest(args: cli::DigestArgs) -> Result<()> {
    logging::init_logging("conduit_node=warn", LogFormat::Pretty);

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let kind = config
        .handlers
        .get(&args.asset_type)
        .with_context(|| format!("config registers no handler for asset type {}", args.asset_type))?;
    let handler = handler_for_kind(kind)
        .with_context(|| format!("unknown handler kind {kind:?}"))?;

    let details = hex::decode(args.details.strip_prefix("0x").unwrap_or(&args.details))
        .context("details are not valid hex")?;
    let digest = handler.operation_hash(&config.network_id, args.asset_type, &details)?;
    println!("{digest}");
    Ok(())
}

/// Loads and validates a config file, then prints a summary.
fn check_config(args: cli::CheckConfigArgs) -> Result<()> {
    logging::init_logging("conduit_node=warn", LogFormat::Pretty);

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    for (asset_type, kind) in &config.handlers {
        if handler_for_kind(kind).is_none() {
            bail!("asset type {asset_type}: unknown handler kind {kind:?}");
        }
    }

    println!("Config OK.");
    println!("  Network   : {}", config.network_id);
    println!("  Threshold : {}", config.threshold);
    println!("  Signers   : {}", config.signers.len());
    println!("  Handlers  : {}", config.handlers.len());
    println!("  Batcher   : {}", config.batcher);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("conduit-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", conduit_protocol::config::PROTOCOL_VERSION);
    println!("signatures   {}", conduit_protocol::config::SIGNING_ALGORITHM);
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
