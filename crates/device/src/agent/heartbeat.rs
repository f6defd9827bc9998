// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Periodic `status` publish: queue depth, last error, uptime (spec §4.3
//! "Heartbeat"). Capabilities are carried on `hello`/reconfigure instead of
//! every tick, since they rarely change.

use std::sync::Arc;
use std::time::Duration;

use labelberry_common::StatusEnvelope;
use tokio_util::sync::CancellationToken;

use crate::agent::bus::DeviceBus;
use crate::state::DeviceState;

pub async fn run(bus: DeviceBus, state: Arc<DeviceState>, interval: Duration, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(e) = bus.publish_status(&StatusEnvelope::offline()).await {
                    tracing::warn!(error = %e, "heartbeat: failed to publish offline status on shutdown");
                }
                return;
            }
            _ = tick.tick() => {
                let status = StatusEnvelope {
                    connected: true,
                    queue_depth: Some(state.queue.size() as u32),
                    last_error: state.last_error.lock().await.clone(),
                    uptime_secs: Some(state.uptime_secs()),
                    capabilities: None,
                };
                if let Err(e) = bus.publish_status(&status).await {
                    tracing::warn!(error = %e, "heartbeat: publish failed");
                }
            }
        }
    }
}
