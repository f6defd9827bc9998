// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Correlation & Wait Engine (spec §4.6): lets a synchronous HTTP submit
//! block on the device-side outcome of a Job without occupying the bus
//! event loop. Modeled on the teacher's drain/ack pattern in
//! `transport/mod.rs` (a `oneshot` per outstanding request, fulfilled by a
//! concurrently running event consumer) generalized from "one write" to
//! "one job lifecycle" and given an explicit deadline/extension/watchdog.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use labelberry_common::{ErrorDetail, ErrorKind, JobState, LifecycleEvent};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Outcome surfaced back to the HTTP caller when a Waiter resolves.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Completed,
    Failed(ErrorDetail),
    Cancelled,
    Expired,
    Timeout,
}

struct Waiter {
    tx: oneshot::Sender<WaitOutcome>,
    deadline: Instant,
    extended_once: bool,
}

pub struct CorrelationEngine {
    waiters: Mutex<HashMap<Uuid, Waiter>>,
    default_deadline: Duration,
    extension: Duration,
}

/// Handle returned to the caller that registered a waiter; awaiting it
/// resolves to the outcome or to a disconnect (dropped sender) which the
/// caller treats identically to a server-side cancel (spec §4.6 "Client
/// disconnect").
pub struct WaitHandle {
    pub job_id: Uuid,
    rx: oneshot::Receiver<WaitOutcome>,
}

impl WaitHandle {
    pub async fn wait(self) -> WaitOutcome {
        self.rx.await.unwrap_or(WaitOutcome::Timeout)
    }
}

impl CorrelationEngine {
    pub fn new(default_deadline: Duration, extension: Duration) -> Self {
        Self { waiters: Mutex::new(HashMap::new()), default_deadline, extension }
    }

    pub async fn register(&self, job_id: Uuid) -> WaitHandle {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.default_deadline;
        self.waiters.lock().await.insert(job_id, Waiter { tx, deadline, extended_once: false });
        WaitHandle { job_id, rx }
    }

    /// Drop a waiter without resolving it (HTTP caller disconnected; the
    /// underlying Job is unaffected, spec §4.6).
    pub async fn forget(&self, job_id: Uuid) {
        self.waiters.lock().await.remove(&job_id);
    }

    /// Feed a lifecycle event observed on the bus. Terminal states resolve
    /// and remove the waiter; `processing` extends the deadline once.
    pub async fn observe(&self, event: LifecycleEvent) {
        let mut waiters = self.waiters.lock().await;
        match event.state {
            JobState::Processing => {
                if let Some(waiter) = waiters.get_mut(&event.job_id) {
                    if !waiter.extended_once {
                        waiter.deadline = Instant::now() + self.extension;
                        waiter.extended_once = true;
                    }
                }
            }
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::Expired => {
                if let Some(waiter) = waiters.remove(&event.job_id) {
                    let outcome = match event.state {
                        JobState::Completed => WaitOutcome::Completed,
                        JobState::Failed => {
                            WaitOutcome::Failed(event.error.unwrap_or_else(|| {
                                ErrorDetail::new(ErrorKind::Internal, "failed with no detail")
                            }))
                        }
                        JobState::Cancelled => WaitOutcome::Cancelled,
                        JobState::Expired => WaitOutcome::Expired,
                        _ => unreachable!(),
                    };
                    let _ = waiter.tx.send(outcome);
                }
            }
            JobState::Queued | JobState::Sent => {}
        }
    }

    /// Resolve a waiter out-of-band, e.g. an admin cancel applied before any
    /// device acknowledgment arrives.
    pub async fn resolve(&self, job_id: Uuid, outcome: WaitOutcome) {
        if let Some(waiter) = self.waiters.lock().await.remove(&job_id) {
            let _ = waiter.tx.send(outcome);
        }
    }

    /// One sweep of the timer wheel (spec §5 "a single timer wheel or
    /// equivalent priority structure"): resolve every waiter whose deadline
    /// has passed with `Timeout`, leaving the Job itself untouched.
    pub async fn sweep_timeouts(&self) {
        let now = Instant::now();
        let mut waiters = self.waiters.lock().await;
        let expired: Vec<Uuid> = waiters.iter().filter(|(_, w)| w.deadline <= now).map(|(id, _)| *id).collect();
        for job_id in expired {
            if let Some(waiter) = waiters.remove(&job_id) {
                let _ = waiter.tx.send(WaitOutcome::Timeout);
            }
        }
    }

    pub async fn outstanding(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

/// Runs `sweep_timeouts` on a fixed tick until cancelled. Spawned once at
/// startup alongside the bus subscriber loop.
pub async fn run_watchdog(engine: std::sync::Arc<CorrelationEngine>, tick: Duration, shutdown: tokio_util::sync::CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => engine.sweep_timeouts().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_on_completed_event() {
        let engine = CorrelationEngine::new(Duration::from_secs(60), Duration::from_secs(30));
        let job_id = Uuid::new_v4();
        let handle = engine.register(job_id).await;

        engine
            .observe(LifecycleEvent { job_id, state: JobState::Completed, at: chrono::Utc::now(), attempt: 1, error: None })
            .await;

        assert!(matches!(handle.wait().await, WaitOutcome::Completed));
    }

    #[tokio::test]
    async fn processing_extends_deadline_once() {
        let engine = CorrelationEngine::new(Duration::from_millis(10), Duration::from_secs(60));
        let job_id = Uuid::new_v4();
        let handle = engine.register(job_id).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        engine
            .observe(LifecycleEvent { job_id, state: JobState::Processing, at: chrono::Utc::now(), attempt: 1, error: None })
            .await;

        // Original 10ms deadline would have fired by now; the extension
        // should keep the waiter alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.sweep_timeouts().await;
        assert_eq!(engine.outstanding().await, 1);

        engine
            .observe(LifecycleEvent { job_id, state: JobState::Completed, at: chrono::Utc::now(), attempt: 1, error: None })
            .await;
        assert!(matches!(handle.wait().await, WaitOutcome::Completed));
    }

    #[tokio::test]
    async fn sweep_times_out_stale_waiters() {
        let engine = CorrelationEngine::new(Duration::from_millis(1), Duration::from_secs(30));
        let job_id = Uuid::new_v4();
        let handle = engine.register(job_id).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.sweep_timeouts().await;

        assert!(matches!(handle.wait().await, WaitOutcome::Timeout));
    }

    #[tokio::test]
    async fn forget_drops_waiter_without_resolving_job() {
        let engine = CorrelationEngine::new(Duration::from_secs(60), Duration::from_secs(30));
        let job_id = Uuid::new_v4();
        let handle = engine.register(job_id).await;
        engine.forget(job_id).await;
        assert_eq!(engine.outstanding().await, 0);
        // Sender dropped; waiting resolves as a disconnect, not a crash.
        let _ = handle.wait().await;
    }
}
