//! Asset Stream Hub Binary
//!
//! Starts the snapshot producer and the WebSocket hub.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin asset-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! - `HUB_PORT`: Listen port (default: 8080)
//! - `HUB_WS_PATH`: WebSocket path (default: /ws)
//! - `HUB_IDENTIFY_CLIENTS`: Expect a JSON string identifier first (default: true)
//! - `PRODUCER_INTERVAL_MS`: Snapshot interval (default: 1000)
//! - `PRODUCER_MAX_RELATIVE_DELTA`: Max price move per tick (default: 0.005)
//! - `PRODUCER_RANDOM_WALK`: Carry price between ticks (default: false)
//! - `ACCOUNT_BALANCE`, `ACCOUNT_POSITION_SIZE`, `ACCOUNT_BASELINE_PRICE`,
//!   `ACCOUNT_LOCK_PRICE`: Simulated account (defaults: 26800.5, 88.8, 100, 100)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use asset_stream_hub::infrastructure::telemetry;
use asset_stream_hub::{
    ConnectionHub, HubConfig, HubServer, HubServerState, SnapshotProducer, UniformDelta,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Asset Stream Hub");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = HubConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(ConnectionHub::new());

    let server_state = Arc::new(HubServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
        config.server.identify_clients,
    ));
    let server = HubServer::bind(&config.server, server_state)
        .await
        .context("failed to start listener")?;

    let producer = SnapshotProducer::new(
        config.account,
        config.producer.into(),
        Box::new(UniformDelta::new(config.producer.max_relative_delta)),
        hub,
    );
    let producer_handle = tokio::spawn(producer.run(shutdown_token.clone()));

    let server_shutdown = shutdown_token.clone();
    let mut server_handle =
        tokio::spawn(async move { server.run(server_shutdown.cancelled_owned()).await });

    tracing::info!("Asset stream hub ready");

    let server_result = tokio::select! {
        () = await_shutdown() => {
            shutdown_token.cancel();
            (&mut server_handle).await
        }
        result = &mut server_handle => {
            shutdown_token.cancel();
            result
        }
    };

    let _ = producer_handle.await;

    match server_result {
        Ok(Ok(())) => {
            tracing::info!("Asset stream hub stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("hub server failed"),
        Err(e) => Err(e).context("hub server task panicked"),
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        port = config.server.port,
        ws_path = %config.server.ws_path,
        identify_clients = config.server.identify_clients,
        interval_ms = u64::try_from(config.producer.interval.as_millis()).unwrap_or(u64::MAX),
        random_walk = config.producer.random_walk,
        "Configuration loaded"
    );
    tracing::debug!(
        balance = %config.account.balance,
        position_size = %config.account.position_size,
        baseline_price = %config.account.baseline_price,
        lock_price = %config.account.lock_price,
        "Simulated account"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
