// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Subscribes to the device→server lifecycle topics for all devices (spec
//! §4.6 "Subscribes to the device→server lifecycle topic for all devices")
//! and to `status`/`hello` for Bus Session Registry liveness (spec §4.4).
//!
//! Mirrors the teacher's NATS relay subscriber: parse `{prefix}.{device}.
//! {kind}` subjects and route by kind, with an eviction timer as a backstop
//! in case a last-will never fires (spec §5 liveness).

use std::sync::Arc;

use futures_util::StreamExt;
use labelberry_common::{topic, Capabilities, HelloEnvelope, LifecycleEvent, StatusEnvelope};
use tokio_util::sync::CancellationToken;

use crate::bus::client::NatsBus;
use crate::bus::registry::BusSessionRegistry;
use crate::dispatch::correlation::CorrelationEngine;
use crate::store::{device_store::DeviceStore, job_store::JobStore};

pub async fn run(
    bus: NatsBus,
    registry: Arc<BusSessionRegistry>,
    correlation: Arc<CorrelationEngine>,
    job_store: Arc<JobStore>,
    device_store: Arc<DeviceStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut status_sub = bus.subscribe(topic::STATUS_WILDCARD).await?;
    let mut events_sub = bus.subscribe(topic::EVENTS_WILDCARD).await?;
    let mut hello_sub = bus.subscribe(topic::HELLO_WILDCARD).await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = status_sub.next() => {
                let Some(msg) = msg else { break };
                if let Some(device_id) = topic::device_id_from_subject(&msg.subject, "status") {
                    handle_status(&registry, device_id, &msg.payload).await;
                }
            }
            msg = events_sub.next() => {
                let Some(msg) = msg else { break };
                if let Some(device_id) = topic::device_id_from_subject(&msg.subject, "events") {
                    handle_event(&registry, &correlation, &job_store, device_id, &msg.payload).await;
                }
            }
            msg = hello_sub.next() => {
                let Some(msg) = msg else { break };
                if let Some(device_id) = topic::device_id_from_subject(&msg.subject, "hello") {
                    handle_hello(&registry, &device_store, device_id, &msg.payload).await;
                }
            }
        }
    }

    Ok(())
}

async fn handle_status(registry: &BusSessionRegistry, device_id: &str, payload: &[u8]) {
    let Ok(status) = serde_json::from_slice::<StatusEnvelope>(payload) else {
        tracing::warn!(device_id, "malformed status payload");
        return;
    };
    if status.connected {
        registry.touch(device_id).await;
    } else {
        // Last-will payload: the device went offline.
        registry.mark_disconnected(device_id).await;
    }
}

async fn handle_hello(registry: &BusSessionRegistry, device_store: &DeviceStore, device_id: &str, payload: &[u8]) {
    let Ok(hello) = serde_json::from_slice::<HelloEnvelope>(payload) else {
        tracing::warn!(device_id, "malformed hello payload");
        return;
    };
    registry.mark_connected(device_id, Some(hello.capabilities.clone())).await;

    let Capabilities { printer_model, firmware_build, .. } = hello.capabilities;
    if let Err(e) = device_store.record_capabilities(device_id, &printer_model, &firmware_build).await {
        tracing::warn!(device_id, error = %e, "failed to persist device capabilities");
    }
}

async fn handle_event(
    registry: &BusSessionRegistry,
    correlation: &CorrelationEngine,
    job_store: &JobStore,
    device_id: &str,
    payload: &[u8],
) {
    let Ok(event) = serde_json::from_slice::<LifecycleEvent>(payload) else {
        tracing::warn!(device_id, "malformed lifecycle event payload");
        return;
    };

    registry.touch(device_id).await;

    match job_store.apply_transition(event.job_id, event.state, event.error.clone()).await {
        Ok(Some(_)) => {}
        Ok(None) => tracing::warn!(job_id = %event.job_id, "lifecycle event for unknown job"),
        Err(e) => tracing::error!(job_id = %event.job_id, error = %e, "failed to persist lifecycle transition"),
    }

    correlation.observe(event).await;
}
