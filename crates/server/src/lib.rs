// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! LabelBerry server: central dispatch for a fleet of ZPL label printers
//! (spec §1). Wires the durable Job/Device/Credential/Offline stores, the
//! NATS bus session registry and lifecycle-event subscriber, the Job
//! Dispatcher and Correlation Engine, and the HTTP API, and runs them
//! until `shutdown` fires.

pub mod bus;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod state;
pub mod store;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Run the server until `shutdown` fires (own internal signal handler, or
/// an externally-supplied token for tests/embedding).
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    run_with_shutdown(config, shutdown).await
}

pub async fn run_with_shutdown(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let pool = db::connect(&config.database_url).await?;
    let bus = bus::NatsBus::connect(&config.bus_url, config.bus_token.as_deref()).await?;

    let state = Arc::new(AppState::new(config.clone(), pool, bus.clone(), shutdown.clone()));

    tokio::spawn(bus::subscriber::run(
        bus.clone(),
        Arc::clone(&state.registry),
        Arc::clone(&state.correlation),
        Arc::clone(&state.job_store),
        Arc::clone(&state.device_store),
        shutdown.clone(),
    ));

    tokio::spawn(dispatch::offline_queue::run(
        bus.clone(),
        Arc::clone(&state.registry),
        Arc::clone(&state.offline_store),
        Arc::clone(&state.job_store),
        shutdown.clone(),
    ));

    tokio::spawn(dispatch::offline_queue::run_expiry_sweep(
        Arc::clone(&state.offline_store),
        Arc::clone(&state.job_store),
        std::time::Duration::from_secs(24 * 3600),
        config.offline_sweep_interval(),
        shutdown.clone(),
    ));

    tokio::spawn(dispatch::run_sweep(
        Arc::clone(&state.job_store),
        config.retention_window(),
        config.sweep_interval(),
        shutdown.clone(),
    ));

    tokio::spawn(dispatch::correlation::run_watchdog(
        Arc::clone(&state.correlation),
        std::time::Duration::from_secs(1),
        shutdown.clone(),
    ));

    let router = http::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    info!("labelberry-server listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// First SIGTERM/SIGINT triggers graceful drain; a second forces exit, in
/// case some background task is stuck.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}
