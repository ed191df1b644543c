//! RegimeWatch - RSI regime monitor
//!
//! Polls public market data, classifies each instrument's regime and sends
//! an alert only when the anti-scalping gate confirms a change.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use regimewatch::config::AppConfig;
use regimewatch::monitor::{shared_board, Monitor, SharedBoard};
use regimewatch::notify::build_notifier;
use regimewatch::oracle::{BinanceRestClient, MarketDataSource};
use regimewatch::persistence::{JsonStateStore, MemoryStateStore, StateStore};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("REGIMEWATCH_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[cfg(feature = "dashboard")]
fn spawn_dashboard(config: &AppConfig, board: SharedBoard) {
    if !config.dashboard.enabled {
        return;
    }
    let bind_addr = config.dashboard.bind_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = regimewatch::dashboard::start_server(board, &bind_addr).await {
            tracing::error!(error = %e, "Dashboard server stopped");
        }
    });
}

#[cfg(not(feature = "dashboard"))]
fn spawn_dashboard(_config: &AppConfig, _board: SharedBoard) {}

/// Flip the watch flag on Ctrl-C or SIGTERM
async fn wait_for_shutdown(tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal, finishing current instrument...");
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is loaded before the filter is read
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::load()?;
    config.validate().context("Invalid configuration")?;

    info!("=== RegimeWatch v{} ===", env!("CARGO_PKG_VERSION"));
    info!(config = %config, "Configuration loaded");

    let source: Arc<dyn MarketDataSource> = Arc::new(
        BinanceRestClient::new(&config.market_data).context("Failed to build market data client")?,
    );
    let notifier = build_notifier(&config.notifier);

    let store: Box<dyn StateStore> = if config.persistence.enabled {
        Box::new(JsonStateStore::new(
            &config.persistence.data_dir,
            &config.persistence.state_file,
        )?)
    } else {
        info!("Persistence disabled, gate state lives in memory only");
        Box::new(MemoryStateStore::new())
    };

    let board = shared_board(chrono::Utc::now().timestamp_millis());
    let mut monitor =
        Monitor::new(&config, source, notifier, store)?.with_board(board.clone());

    match monitor.restore() {
        Ok(restored) => info!(instruments = restored, "Gate state restored"),
        Err(e) => warn!(error = %e, "Could not restore gate state, starting fresh"),
    }

    spawn_dashboard(&config, board);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    monitor.run(shutdown_rx).await?;

    info!("👋 RegimeWatch stopped");
    Ok(())
}
