// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Bus Session Registry (spec §4.4) — tracks which devices are currently
//! connected, fed by bus notifications. Modeled on the teacher's agent pod
//! registry: a `RwLock<HashMap<...>>` of live entries with a per-device
//! mutex serializing connect/disconnect races (spec §5 "single writer per
//! device-id").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use labelberry_common::Capabilities;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};

/// A live Bus Session (spec §3).
#[derive(Debug, Clone)]
pub struct BusSession {
    pub device_id: String,
    pub session_handle: uuid::Uuid,
    pub connected_at: Instant,
    pub last_heartbeat_at: Instant,
    pub capabilities: Option<Capabilities>,
    pub in_flight_jobs: u32,
}

/// Serializable snapshot for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub device_id: String,
    pub connected: bool,
    pub last_heartbeat_secs_ago: u64,
    pub in_flight_jobs: u32,
}

/// Emitted when `mark_connected` atomically displaces a still-registered
/// session (spec §3 "a second authenticated connect atomically displaces
/// the first").
#[derive(Debug, Clone)]
pub struct Displaced {
    pub device_id: String,
    pub old_session: uuid::Uuid,
}

pub struct BusSessionRegistry {
    sessions: RwLock<HashMap<String, BusSession>>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    liveness_window: Duration,
    displaced_tx: broadcast::Sender<Displaced>,
    /// Fired when a device transitions disconnected → connected, consumed
    /// by the Offline Queue drain task (spec §4.7).
    reconnect_tx: broadcast::Sender<String>,
}

impl BusSessionRegistry {
    pub fn new(liveness_window: Duration) -> Self {
        let (displaced_tx, _) = broadcast::channel(256);
        let (reconnect_tx, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            liveness_window,
            displaced_tx,
            reconnect_tx,
        }
    }

    pub fn subscribe_displaced(&self) -> broadcast::Receiver<Displaced> {
        self.displaced_tx.subscribe()
    }

    pub fn subscribe_reconnect(&self) -> broadcast::Receiver<String> {
        self.reconnect_tx.subscribe()
    }

    async fn lock_for(&self, device_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(device_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(device_id.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// `true` iff the last-observed event is within the bounded staleness
    /// window (spec §4.4 "is_connected is authoritative ... bounded
    /// staleness"; spec §5 "a device that has missed N heartbeats is
    /// treated as disconnected even without a last-will").
    pub async fn is_connected(&self, device_id: &str) -> bool {
        match self.sessions.read().await.get(device_id) {
            Some(s) => s.last_heartbeat_at.elapsed() < self.liveness_window,
            None => false,
        }
    }

    /// Atomically replace any existing session, displacing its owner.
    pub async fn mark_connected(&self, device_id: &str, caps: Option<Capabilities>) {
        let lock = self.lock_for(device_id).await;
        let _guard = lock.lock().await;

        let was_live = self.is_connected(device_id).await;
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(device_id) {
            let _ = self.displaced_tx.send(Displaced {
                device_id: device_id.to_owned(),
                old_session: existing.session_handle,
            });
        }

        sessions.insert(
            device_id.to_owned(),
            BusSession {
                device_id: device_id.to_owned(),
                session_handle: uuid::Uuid::new_v4(),
                connected_at: Instant::now(),
                last_heartbeat_at: Instant::now(),
                capabilities: caps,
                in_flight_jobs: 0,
            },
        );
        drop(sessions);

        if !was_live {
            let _ = self.reconnect_tx.send(device_id.to_owned());
        }
    }

    pub async fn mark_disconnected(&self, device_id: &str) {
        let lock = self.lock_for(device_id).await;
        let _guard = lock.lock().await;
        self.sessions.write().await.remove(device_id);
    }

    /// Refresh liveness on any observed heartbeat or command ack (spec §5).
    pub async fn touch(&self, device_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(device_id) {
            session.last_heartbeat_at = Instant::now();
        }
    }

    pub async fn increment_in_flight(&self, device_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(device_id) {
            session.in_flight_jobs += 1;
        }
    }

    pub async fn decrement_in_flight(&self, device_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(device_id) {
            session.in_flight_jobs = session.in_flight_jobs.saturating_sub(1);
        }
    }

    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| SessionInfo {
                device_id: s.device_id.clone(),
                connected: s.last_heartbeat_at.elapsed() < self.liveness_window,
                last_heartbeat_secs_ago: s.last_heartbeat_at.elapsed().as_secs(),
                in_flight_jobs: s.in_flight_jobs,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_session_per_device() {
        let registry = BusSessionRegistry::new(Duration::from_secs(180));
        let mut displaced_rx = registry.subscribe_displaced();

        registry.mark_connected("D1", None).await;
        assert!(registry.is_connected("D1").await);

        registry.mark_connected("D1", None).await;
        let event = displaced_rx.try_recv().expect("displaced event");
        assert_eq!(event.device_id, "D1");

        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_fires_drain_signal() {
        let registry = BusSessionRegistry::new(Duration::from_secs(180));
        let mut reconnect_rx = registry.subscribe_reconnect();

        registry.mark_connected("D1", None).await;
        reconnect_rx.try_recv().expect("initial connect fires reconnect");

        registry.mark_disconnected("D1").await;
        assert!(!registry.is_connected("D1").await);

        registry.mark_connected("D1", None).await;
        let device_id = reconnect_rx.try_recv().expect("reconnect signal");
        assert_eq!(device_id, "D1");
    }

    #[tokio::test]
    async fn staleness_treated_as_disconnected() {
        let registry = BusSessionRegistry::new(Duration::from_millis(1));
        registry.mark_connected("D1", None).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!registry.is_connected("D1").await);
    }
}
