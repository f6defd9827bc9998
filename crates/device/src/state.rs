// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Shared device state, injected into the local HTTP handlers and polled
//! by the heartbeat task. Mirrors the server's `AppState`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use labelberry_common::{Capabilities, LifecycleEvent};

use crate::config::DeviceConfig;
use crate::queue::DeviceQueue;

pub struct DeviceState {
    pub config: DeviceConfig,
    pub queue: Arc<DeviceQueue>,
    pub events_tx: mpsc::Sender<LifecycleEvent>,
    pub started_at: Instant,
    pub last_error: Mutex<Option<String>>,
    /// Live capabilities, seeded from config at startup and updated in place
    /// when a `reconfigure` changes `label_size` (spec §4.3).
    pub capabilities: Mutex<Capabilities>,
    pub shutdown: CancellationToken,
}

impl DeviceState {
    pub fn new(
        config: DeviceConfig,
        queue: Arc<DeviceQueue>,
        events_tx: mpsc::Sender<LifecycleEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let capabilities = Mutex::new(config.capabilities());
        Self { config, queue, events_tx, started_at: Instant::now(), last_error: Mutex::new(None), capabilities, shutdown }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
