// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Offline Queue drain (spec §4.7): when a device reconnects, publish its
//! backlog of pending command envelopes in enqueue order, removing each on
//! publish success. A concurrent disconnect aborts the drain; the remaining
//! backlog is picked up on the next reconnect.

use std::sync::Arc;
use std::time::Duration;

use labelberry_common::ErrorDetail;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusSessionRegistry, NatsBus};
use crate::store::job_store::JobStore;
use crate::store::offline_store::OfflineStore;

/// Runs until `shutdown` fires: waits for reconnect signals from the
/// registry and drains that device's backlog.
pub async fn run(
    bus: NatsBus,
    registry: Arc<BusSessionRegistry>,
    offline: Arc<OfflineStore>,
    job_store: Arc<JobStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut reconnect_rx = registry.subscribe_reconnect();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            device_id = reconnect_rx.recv() => {
                let Ok(device_id) = device_id else { continue };
                drain_device(&bus, &registry, &offline, &job_store, &device_id).await;
            }
        }
    }
    Ok(())
}

async fn drain_device(
    bus: &NatsBus,
    registry: &BusSessionRegistry,
    offline: &OfflineStore,
    job_store: &JobStore,
    device_id: &str,
) {
    let entries = match offline.list_for_device(device_id).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(device_id, error = %e, "failed to load offline queue for drain");
            return;
        }
    };

    for entry in entries {
        // A disconnect mid-drain stops delivery; the remainder is drained
        // on the next reconnect signal.
        if !registry.is_connected(device_id).await {
            break;
        }
        match bus.publish_command(device_id, &entry.envelope).await {
            Ok(()) => {
                if let Err(e) = offline.remove(entry.id).await {
                    tracing::error!(device_id, error = %e, "failed to remove drained offline entry");
                }
                // Mirror the online `route` path (dispatch/mod.rs): a
                // published command moves the Job to `sent` and counts
                // against the device's in-flight total, same as if it had
                // never gone through the offline queue (spec §4.5 step 4).
                if let Err(e) = job_store.mark_sent(entry.job_id).await {
                    tracing::error!(device_id, job_id = %entry.job_id, error = %e, "failed to mark drained job sent");
                }
                registry.increment_in_flight(device_id).await;
            }
            Err(e) => {
                tracing::warn!(device_id, error = %e, "offline drain publish failed, will retry next reconnect");
                break;
            }
        }
    }
}

/// Periodic bounded-expiry sweep (spec §4.7 "entries older than 24h are
/// dropped and their Jobs transitioned to expired").
pub async fn run_expiry_sweep(
    offline: Arc<OfflineStore>,
    job_store: Arc<JobStore>,
    window: Duration,
    tick: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let cutoff = chrono::Utc::now() - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(24));
                match offline.sweep_expired(cutoff).await {
                    Ok(entries) => {
                        for entry in entries {
                            let error = ErrorDetail::new(
                                labelberry_common::ErrorKind::Expired,
                                "offline queue entry exceeded 24h bound",
                            );
                            if let Err(e) = job_store
                                .apply_transition(entry.job_id, labelberry_common::JobState::Expired, Some(error))
                                .await
                            {
                                tracing::error!(job_id = %entry.job_id, error = %e, "failed to expire job for swept offline entry");
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "offline queue expiry sweep failed"),
                }
            }
        }
    }
}
