//! Global BUSAN donation service.
//!
//! # Architecture Overview
//!
//! ```text
//!   wallet / card / hosted checkout
//!            │
//!            ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ DonationService                                              │
//!   │  validate → submit → wait (adapter poll) → verify → record   │
//!   └───────┬──────────────────┬───────────────────────┬───────────┘
//!           │                  │                       │
//!     chain adapters     processor clients        ledger store
//!    (EVM, Solana RPC)  (Stripe, Coinbase)   (memory+snapshot, Supabase)
//!
//!   admin API (ledger, refunds, explorer links) ── bearer token
//!   config watcher (rates, minimums) · metrics · signals
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use busan_donations::admin::{setup_admin_router, AdminState};
use busan_donations::chain::RpcHealthMonitor;
use busan_donations::config::{apply_reload, load_config, AppConfig, ConfigWatcher};
use busan_donations::lifecycle::{build_runtime, handle_signals, Shutdown};
use busan_donations::observability::{init_logging, init_metrics};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "busan-donations", version, about = "Global BUSAN donation service")]
struct Args {
    /// TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "busan-donations starting");

    if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" && std::env::var_os(busan_donations::config::ADMIN_API_KEY_ENV).is_none() {
        tracing::warn!("Admin API key is the placeholder default; set BUSAN_ADMIN_API_KEY");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime = build_runtime(&config).await?;
    let service = runtime.service.clone();
    let shutdown = Arc::new(Shutdown::new());
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(
        RpcHealthMonitor::new(
            runtime.evm_clients,
            Duration::from_secs(config.observability.rpc_health_interval_secs),
        )
        .run(shutdown.subscribe()),
    ));

    // File changes and SIGHUP both funnel into the same reload path.
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();
    let (mut updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(updates), Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable; hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    {
        let service = service.clone();
        let path = args.config.clone();
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    Some(config) = async { updates.as_mut()?.recv().await } => Some(config),
                    Some(()) = reload_rx.recv() => match &path {
                        Some(path) => match load_config(path) {
                            Ok(config) => Some(config),
                            Err(e) => {
                                tracing::error!(error = %e, "Reload failed. Keeping current configuration.");
                                None
                            }
                        },
                        None => None,
                    },
                    _ = stop.recv() => break,
                };
                if let Some(config) = next {
                    apply_reload(&config, service.converter(), service.validator());
                }
            }
        }));
    }

    let listener = if config.admin.enabled {
        let listener = TcpListener::bind(&config.server.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        Some(listener)
    } else {
        tracing::info!("Admin API disabled");
        None
    };

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { handle_signals(&shutdown, reload_tx).await }
    });

    if let Some(listener) = listener {
        let state = AdminState::new(service.clone(), config.admin.resolved_api_key());
        let router = setup_admin_router(state, Duration::from_secs(config.server.request_timeout_secs));
        let stop = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.triggered().await })
            .await?;
    } else {
        shutdown.triggered().await;
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    Shutdown::drain(tasks, SHUTDOWN_DEADLINE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
