// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Grant Vault Node
//!
//! Entry point for the `grantvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, restores the runtime from its snapshot,
//! and serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`    : start the node
//! - `init`   : create the data directory and an empty snapshot
//! - `status` : query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod store;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use grantvault_contracts::config::CONTRACTS_VERSION;
use grantvault_contracts::{Runtime, SystemClock};

use cli::{Commands, GrantVaultCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GrantVaultCli::parse();

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

/// Restores state, then serves the API and metrics endpoints until a
/// shutdown signal arrives. State is written back on the way out.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "grantvault_node=info,grantvault_contracts=info,tower_http=debug",
        LogFormat::from(args.log_format),
    );

    let data_dir = store::expand_home(&args.data_dir);
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %data_dir.display(),
        "starting grantvault-node"
    );

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Runtime ---
    let snapshot_path = store::snapshot_path(&data_dir);
    let runtime = match store::load(&snapshot_path)? {
        Some(snapshot) => {
            if snapshot.vault_address() != args.vault_address {
                tracing::warn!(
                    configured = %args.vault_address,
                    snapshot = %snapshot.vault_address(),
                    "vault address from snapshot overrides configuration"
                );
            }
            Runtime::from_snapshot(snapshot, Arc::new(SystemClock))
                .with_context(|| format!("failed to restore {}", snapshot_path.display()))?
        }
        None => {
            tracing::info!(path = %snapshot_path.display(), "no snapshot found, starting empty");
            Runtime::new(args.vault_address.clone(), Arc::new(SystemClock))
        }
    };
    let runtime = Arc::new(runtime.with_event_hook(api::publish_to(event_tx.clone())));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics
        .active_grants
        .set(runtime.grant_count() as i64);

    let app_state = api::AppState {
        version: format!(
            "{} (contracts {})",
            env!("CARGO_PKG_VERSION"),
            CONTRACTS_VERSION
        ),
        runtime: Arc::clone(&runtime),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
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

    if let Some(violation) = store::persist(&snapshot_path, &runtime.snapshot())? {
        bail!("state audit failed: {}", violation);
    }
    tracing::info!("grantvault-node stopped");
    Ok(())
}

/// Creates the data directory and writes an empty snapshot.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("grantvault_node=info", LogFormat::Pretty);

    let data_dir = store::expand_home(&args.data_dir);
    let snapshot_path = store::snapshot_path(&data_dir);
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    if snapshot_path.exists() && !args.force {
        bail!(
            "snapshot already exists at {} (pass --force to overwrite)",
            snapshot_path.display()
        );
    }

    let runtime = Runtime::new(args.vault_address.clone(), Arc::new(SystemClock));
    store::save(&snapshot_path, &runtime.snapshot())?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Snapshot       : {}", snapshot_path.display());
    println!("  Vault address  : {}", args.vault_address);

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let (host, port) = parse_endpoint(&args.rpc_url)?;
    let body = http_get(&host, port, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// Splits `http://host:port[/...]` into host and port. Port defaults to 80.
fn parse_endpoint(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        bail!("missing host in URL: {}", url);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("bad port in URL: {}", url))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 80)),
    }
}

/// Minimal HTTP/1.1 GET over a raw TCP stream. Returns the response body.
async fn http_get(host: &str, port: u16, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = format!("{}:{}", host, port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("grantvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("contracts       {}", CONTRACTS_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            parse_endpoint("http://127.0.0.1:8645").unwrap(),
            ("127.0.0.1".to_string(), 8645)
        );
        assert_eq!(
            parse_endpoint("http://node.local/").unwrap(),
            ("node.local".to_string(), 80)
        );
        assert!(parse_endpoint("http://host:notaport").is_err());
        assert!(parse_endpoint("http://").is_err());
    }
}
