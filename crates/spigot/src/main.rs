//! spigot - bridge a stdio JSON-RPC subprocess to many SSE clients.
//!
//! ## Usage
//!
//! ```bash
//! # Bridge a stdio server, listening on the default port
//! spigot --stdio "my-server --flag"
//!
//! # With health checks, static headers and idle shutdown
//! spigot --stdio "my-server" --port 9200 \
//!     --health-endpoint /healthz \
//!     --header "X-Api-Key: secret" \
//!     --idle-timeout-secs 300
//!
//! # With a config file (flags override file values)
//! spigot --config /etc/spigot/config.toml
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::signal;

use spigot::api::{AppState, routes};
use spigot::bridge::Bridge;
use spigot::config::{AppConfig, ConfigFile, parse_header};
use spigot::idle::IdleController;
use spigot::shutdown::{self, ShutdownReason, ShutdownSender};
use spigot::supervisor::ChildSupervisor;

#[derive(Parser, Debug)]
#[command(
    name = "spigot",
    about = "Expose a stdio JSON-RPC subprocess as a multi-client SSE service"
)]
struct Args {
    /// Subprocess command line (run under `sh -c`).
    #[arg(long = "stdio", value_name = "COMMAND")]
    stdio: Option<String>,

    /// Path to config file. Flags override file values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// SSE connection path.
    #[arg(long)]
    sse_path: Option<String>,

    /// Inbound message path.
    #[arg(long)]
    message_path: Option<String>,

    /// Health endpoint path (repeatable).
    #[arg(long = "health-endpoint", value_name = "PATH")]
    health_endpoints: Vec<String>,

    /// Allowed CORS origin (repeatable, `*` for any).
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    cors_origins: Vec<String>,

    /// Static response header as `Name: value` (repeatable).
    #[arg(long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Idle shutdown span in seconds with no connected sessions (0 disables).
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn resolve_config(args: Args) -> Result<AppConfig> {
    let file = match &args.config {
        Some(path) => ConfigFile::load_from_path(path),
        None => ConfigFile::default(),
    };

    let command = args
        .stdio
        .or(file.child.command)
        .context("no subprocess command given (use --stdio or [child].command)")?;

    let mut headers: HashMap<String, String> = file.server.headers;
    for raw in &args.headers {
        match parse_header(raw) {
            Some((name, value)) => {
                headers.insert(name, value);
            }
            None => warn!("Ignoring malformed --header '{}'", raw),
        }
    }

    let mut health_endpoints = file.server.health_endpoints;
    health_endpoints.extend(args.health_endpoints);

    let mut cors_origins = file.server.cors_origins;
    cors_origins.extend(args.cors_origins);

    let idle_timeout_secs = args.idle_timeout_secs.unwrap_or(file.idle.timeout_secs);

    Ok(AppConfig {
        command,
        bind: args.bind.unwrap_or(file.server.bind),
        port: args.port.unwrap_or(file.server.port),
        sse_path: args.sse_path.unwrap_or(file.server.sse_path),
        message_path: args.message_path.unwrap_or(file.server.message_path),
        health_endpoints,
        cors_origins,
        headers,
        idle_timeout: (idle_timeout_secs > 0).then_some(Duration::from_secs(idle_timeout_secs)),
    })
}

/// Forward SIGINT/SIGTERM into the shutdown funnel.
async fn watch_signals(shutdown_tx: ShutdownSender) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for ctrl-c: {}", e);
                return;
            }
        }
        _ = terminate => {}
    }

    info!("Termination signal received");
    let _ = shutdown_tx.send(ShutdownReason::Signal).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = resolve_config(args)?;

    info!(
        "Starting spigot: child command '{}', listening on {}:{}",
        config.command, config.bind, config.port
    );

    let (shutdown_tx, mut shutdown_rx) = shutdown::channel();

    let (child, stdout, stderr) = ChildSupervisor::spawn(&config.command, shutdown_tx.clone())?;

    let idle = IdleController::new(config.idle_timeout, shutdown_tx.clone());
    let bridge = Bridge::new(Arc::clone(&child), idle);
    bridge.start(stdout, stderr).await;

    let state = AppState {
        bridge: Arc::clone(&bridge),
        message_path: config.message_path.clone(),
    };
    let router = routes::create_router(state, &config);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        "SSE endpoint on http://{}{}, messages on {}",
        addr, config.sse_path, config.message_path
    );

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::spawn(watch_signals(shutdown_tx));

    let reason = shutdown_rx.recv().await.unwrap_or(ShutdownReason::Signal);
    info!("Shutting down: {}", reason);

    // Disarm first so a late timer cannot fire into the teardown.
    bridge.disarm_idle().await;
    child.kill();
    let _ = tokio::time::timeout(Duration::from_secs(5), child.wait_exited()).await;

    std::process::exit(reason.exit_code());
}
