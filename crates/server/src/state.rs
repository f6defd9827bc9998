// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Shared server state, injected into every axum handler via `State`.
//! Mirrors the teacher's `MuxState`: one struct owning the long-lived
//! collaborators, handed to the router as `Arc<AppState>`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::{BusSessionRegistry, NatsBus};
use crate::config::ServerConfig;
use crate::dispatch::{CorrelationEngine, Dispatcher};
use crate::store::{CredentialStore, DeviceStore, JobStore, OfflineStore};

pub struct AppState {
    pub config: ServerConfig,
    pub dispatcher: Dispatcher,
    pub device_store: Arc<DeviceStore>,
    pub job_store: Arc<JobStore>,
    pub credential_store: Arc<CredentialStore>,
    pub offline_store: Arc<OfflineStore>,
    pub registry: Arc<BusSessionRegistry>,
    pub correlation: Arc<CorrelationEngine>,
    pub bus: NatsBus,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        pool: sqlx::SqlitePool,
        bus: NatsBus,
        shutdown: CancellationToken,
    ) -> Self {
        let device_store = Arc::new(DeviceStore::new(pool.clone()));
        let job_store = Arc::new(JobStore::new(pool.clone()));
        let credential_store = Arc::new(CredentialStore::new(pool.clone()));
        let offline_store = Arc::new(OfflineStore::new(pool));
        let registry = Arc::new(BusSessionRegistry::new(config.liveness_window()));
        let correlation = Arc::new(CorrelationEngine::new(config.waiter_deadline(), config.waiter_extension()));

        let dispatcher = Dispatcher::new(
            Arc::clone(&job_store),
            Arc::clone(&offline_store),
            Arc::clone(&device_store),
            Arc::clone(&registry),
            Arc::clone(&correlation),
            bus.clone(),
            config.offline_queue_capacity,
        );

        Self {
            config,
            dispatcher,
            device_store,
            job_store,
            credential_store,
            offline_store,
            registry,
            correlation,
            bus,
            shutdown,
        }
    }
}
