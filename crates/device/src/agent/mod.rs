// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device Agent (spec §4.3): owns the bus session, dispatches incoming
//! commands to the Queue, publishes lifecycle events, and serves the
//! local HTTP surface. Mirrors the server's `lib.rs` task-spawning shape.

pub mod bus;
pub mod heartbeat;
pub mod http;

use std::sync::Arc;

use futures_util::StreamExt;
use labelberry_common::{CommandKind, HelloEnvelope, JobSource, JobState, LifecycleEvent, ReconfigurePayload};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::bus::DeviceBus;
use crate::config::DeviceConfig;
use crate::error::QueueError;
use crate::printer::PrinterDriver;
use crate::queue::worker::PayloadResolver;
use crate::queue::DeviceQueue;
use crate::state::DeviceState;

/// Run the Device Agent until `shutdown` fires: connect the bus, announce
/// capabilities, and drive the command subscriber, queue-worker,
/// heartbeat, and local HTTP tasks concurrently.
pub async fn run(mut config: DeviceConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    config.load_file()?;
    let device_id = config.device_id()?.to_owned();
    let secret = config.device_secret()?.to_owned();

    let bus = DeviceBus::connect(config.bus_url(), &device_id, &secret).await?;
    let queue = Arc::new(DeviceQueue::load(config.queue_capacity(), config.queue_journal())?);
    let printer = Arc::new(PrinterDriver::new(config.printer_path.clone()));
    let resolver = Arc::new(PayloadResolver::new());

    let (events_tx, events_rx) = mpsc::channel(256);
    let state = Arc::new(DeviceState::new(config.clone(), Arc::clone(&queue), events_tx.clone(), shutdown.clone()));

    bus.publish_hello(&HelloEnvelope { device_id: device_id.clone(), capabilities: state.capabilities.lock().await.clone() })
        .await?;

    tokio::spawn(crate::queue::worker::run(
        Arc::clone(&queue),
        Arc::clone(&printer),
        resolver,
        events_tx,
        shutdown.clone(),
    ));

    tokio::spawn(publish_events(bus.clone(), events_rx, Arc::clone(&state), shutdown.clone()));

    tokio::spawn(heartbeat::run(bus.clone(), Arc::clone(&state), config_heartbeat(&state), shutdown.clone()));

    tokio::spawn(run_command_subscriber(
        bus.clone(),
        Arc::clone(&queue),
        Arc::clone(&printer),
        Arc::clone(&state),
        shutdown.clone(),
    ));

    let router = http::build_router(Arc::clone(&state));
    let addr = format!("{}:{}", state.config.local_host, state.config.local_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("labelberry-device listening locally on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

fn config_heartbeat(state: &DeviceState) -> std::time::Duration {
    state.config.heartbeat_interval()
}

/// Forward lifecycle events produced by the queue-worker (and the local
/// HTTP handlers' own enqueues) onto the bus `events` topic, and track the
/// last failure for `/status` and heartbeat reporting.
async fn publish_events(
    bus: DeviceBus,
    mut events_rx: mpsc::Receiver<LifecycleEvent>,
    state: Arc<DeviceState>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            event = events_rx.recv() => {
                let Some(event) = event else { return };
                if event.state == JobState::Failed {
                    if let Some(ref err) = event.error {
                        *state.last_error.lock().await = Some(err.message.clone());
                    }
                }
                if let Err(e) = bus.publish_event(&event).await {
                    tracing::warn!(job_id = %event.job_id, error = %e, "failed to publish lifecycle event");
                }
            }
        }
    }
}

/// Subscribe to `commands` and `config` (spec §4.3) and dispatch each
/// received message to the Queue or Printer Driver.
async fn run_command_subscriber(
    bus: DeviceBus,
    queue: Arc<DeviceQueue>,
    printer: Arc<PrinterDriver>,
    state: Arc<DeviceState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut commands = bus.subscribe_commands().await?;
    let mut configs = bus.subscribe_config().await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = commands.next() => {
                let Some(msg) = msg else { break };
                handle_command(&queue, &printer, &msg.payload);
            }
            msg = configs.next() => {
                let Some(msg) = msg else { break };
                handle_config(&bus, &printer, &state, &msg.payload).await;
            }
        }
    }

    Ok(())
}

fn handle_command(queue: &DeviceQueue, printer: &PrinterDriver, payload: &[u8]) {
    let envelope = match bus::parse_command(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "malformed command envelope");
            return;
        }
    };

    match envelope.kind {
        CommandKind::Print | CommandKind::TestPrint => {
            let Some(job_payload) = envelope.payload else {
                tracing::warn!(job_id = %envelope.job_id, "print command missing payload");
                return;
            };
            // The device has no visibility into whether the server's own
            // dispatch was single-device or fleet-wide; either way it
            // arrived over the bus rather than the local HTTP surface.
            match queue.enqueue(envelope.job_id, job_payload, envelope.priority, JobSource::Api) {
                Ok(_) => {}
                Err(QueueError::Full) => tracing::warn!(job_id = %envelope.job_id, "local queue full, dropping command"),
                Err(e) => tracing::warn!(job_id = %envelope.job_id, error = %e, "enqueue failed"),
            }
        }
        CommandKind::Cancel => {
            if let Err(e) = queue.cancel(envelope.job_id) {
                tracing::warn!(job_id = %envelope.job_id, error = %e, "cancel failed");
            }
        }
        CommandKind::Reconfigure => {
            tracing::debug!(job_id = %envelope.job_id, "reconfigure arrived on commands topic, ignoring (expected on config topic)");
            let _ = printer;
        }
        CommandKind::Ping => {
            tracing::debug!(job_id = %envelope.job_id, "ping received");
        }
    }
}

/// Apply a `reconfigure` (spec §4.3): update the printer path in place, and
/// if `label_size` changed, update the live capabilities and republish
/// `hello` so the server's view of the fleet stays current.
async fn handle_config(bus: &DeviceBus, printer: &PrinterDriver, state: &Arc<DeviceState>, payload: &[u8]) {
    let reconfigure: ReconfigurePayload = match serde_json::from_slice(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed reconfigure payload");
            return;
        }
    };
    if let Some(path) = reconfigure.printer_path {
        printer.reconfigure(Some(path));
    }
    if let Some(label_size) = reconfigure.label_size {
        let capabilities = {
            let mut guard = state.capabilities.lock().await;
            guard.label_size = label_size;
            guard.clone()
        };
        let device_id = state.config.device_id().unwrap_or_default().to_owned();
        if let Err(e) = bus.publish_hello(&HelloEnvelope { device_id, capabilities }).await {
            tracing::warn!(error = %e, "failed to republish capabilities after reconfigure");
        }
    }
}
