// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Job Dispatcher (spec §4.5): the single entry point that turns a
//! normalized print request into a routed, persisted, optionally-awaited
//! Job. Everything else in this crate (Registry, Correlation Engine, Offline
//! Queue, Job Store) is a collaborator this module composes.

pub mod correlation;
pub mod offline_queue;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use labelberry_common::{CommandEnvelope, ErrorDetail, ErrorKind, JobSource, JobState, Payload, Priority};
use uuid::Uuid;

use crate::bus::{BusSessionRegistry, NatsBus};
use crate::error::DispatchError;
use crate::store::device_store::DeviceStore;
use crate::store::job_store::{JobFilter, JobStore, NewJob};
use crate::store::offline_store::OfflineStore;
use crate::store::Job;

pub use correlation::{CorrelationEngine, WaitOutcome};

/// Preconditions + routing inputs for `Dispatcher::submit` (spec §4.5).
pub struct SubmitRequest {
    pub device_id: String,
    pub payload: Payload,
    pub priority: Priority,
    pub wait: bool,
    /// Reject synchronously instead of offline-queueing when the device is
    /// not connected (HTTP `409` row in spec §6).
    pub fail_if_offline: bool,
    pub source: JobSource,
    /// Caller-supplied idempotency key (spec §4.5 "Idempotency").
    pub idempotency_key: Option<String>,
}

/// What `submit` hands back to the HTTP layer, which maps it to a status
/// code and body.
#[derive(Debug, Clone)]
pub enum SubmissionResult {
    /// `wait = false`: the Job was routed (sent or queued) and the caller
    /// does not block on its outcome.
    Accepted { job_id: Uuid, status: JobState },
    /// `wait = true` and the waiter resolved with the device reporting
    /// `completed`.
    Completed { job_id: Uuid },
    /// `wait = true` and the waiter resolved with the device reporting
    /// `failed`.
    Failed { job_id: Uuid, error: ErrorDetail },
    /// `wait = true` and the waiter resolved with `cancelled`.
    Cancelled { job_id: Uuid },
    /// `wait = true` and the waiter resolved with `expired`.
    Expired { job_id: Uuid },
    /// `wait = true` and the deadline elapsed before any terminal event;
    /// the Job continues running independently of this response (spec
    /// §4.5 step 4).
    Timeout { job_id: Uuid },
}

impl SubmissionResult {
    fn from_outcome(job_id: Uuid, outcome: WaitOutcome) -> Self {
        match outcome {
            WaitOutcome::Completed => Self::Completed { job_id },
            WaitOutcome::Failed(error) => Self::Failed { job_id, error },
            WaitOutcome::Cancelled => Self::Cancelled { job_id },
            WaitOutcome::Expired => Self::Expired { job_id },
            WaitOutcome::Timeout => Self::Timeout { job_id },
        }
    }

    /// Replay result for an idempotent resubmission (spec §4.5
    /// "Idempotency" — re-submitting returns the existing Job).
    fn from_existing(job: &Job) -> Self {
        match job.state {
            JobState::Completed => Self::Completed { job_id: job.id },
            JobState::Failed => Self::Failed {
                job_id: job.id,
                error: job.error.clone().unwrap_or_else(|| ErrorDetail::new(ErrorKind::Internal, "failed with no detail")),
            },
            JobState::Cancelled => Self::Cancelled { job_id: job.id },
            JobState::Expired => Self::Expired { job_id: job.id },
            other => Self::Accepted { job_id: job.id, status: other },
        }
    }
}

/// One device's outcome within a `broadcast` call (spec §4.5 "Broadcast").
pub struct BroadcastOutcome {
    pub device_id: String,
    pub result: Result<SubmissionResult, DispatchError>,
}

pub struct Dispatcher {
    job_store: Arc<JobStore>,
    offline_store: Arc<OfflineStore>,
    device_store: Arc<DeviceStore>,
    registry: Arc<BusSessionRegistry>,
    correlation: Arc<CorrelationEngine>,
    bus: NatsBus,
    offline_capacity: usize,
}

impl Dispatcher {
    pub fn new(
        job_store: Arc<JobStore>,
        offline_store: Arc<OfflineStore>,
        device_store: Arc<DeviceStore>,
        registry: Arc<BusSessionRegistry>,
        correlation: Arc<CorrelationEngine>,
        bus: NatsBus,
        offline_capacity: usize,
    ) -> Self {
        Self { job_store, offline_store, device_store, registry, correlation, bus, offline_capacity }
    }

    /// `submit` — spec §4.5 "Public operation".
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmissionResult, DispatchError> {
        if let Some(ref key) = req.idempotency_key {
            if let Some(existing) = self.job_store.find_by_correlation(&req.device_id, key).await? {
                return Ok(SubmissionResult::from_existing(&existing));
            }
        }

        if self.device_store.get(&req.device_id).await?.is_none() {
            return Err(DispatchError::DeviceNotFound(req.device_id.clone()));
        }

        if !req.payload.is_valid() {
            return Err(DispatchError::InvalidRequest(
                "payload must specify exactly one of zpl_raw, zpl_url, zpl_file".into(),
            ));
        }

        let online = self.registry.is_connected(&req.device_id).await;
        if !online {
            if req.fail_if_offline {
                // Spec §6 response table: `409` when the caller was going
                // to wait for completion and there's a synchronous
                // conflict to report; `503` when the caller never intended
                // to wait and just wanted immediate delivery.
                return Err(if req.wait { DispatchError::DeviceOffline } else { DispatchError::DeviceOfflineImmediate });
            }
            let pending = self.offline_store.count_for_device(&req.device_id).await?;
            if pending as usize >= self.offline_capacity {
                return Err(DispatchError::QueueFullOffline);
            }
        }

        let job_id = Uuid::new_v4();
        self.job_store
            .create(NewJob {
                id: job_id,
                device_id: req.device_id.clone(),
                payload: req.payload.clone(),
                priority: req.priority,
                source: req.source,
                wait_for_completion: req.wait,
                correlation_id: req.idempotency_key.clone(),
            })
            .await?;

        let envelope = CommandEnvelope::print(job_id, req.payload, req.priority);
        self.route(&req.device_id, job_id, &envelope, online).await?;

        if !req.wait {
            let status = self.job_store.get(job_id).await?.map(|j| j.state).unwrap_or(JobState::Queued);
            return Ok(SubmissionResult::Accepted { job_id, status });
        }

        let handle = self.correlation.register(job_id).await;
        let outcome = handle.wait().await;
        Ok(SubmissionResult::from_outcome(job_id, outcome))
    }

    /// `broadcast` — N independent `submit` calls; one device's failure
    /// never rolls back another's (spec §4.5, Design Note b).
    pub async fn broadcast(
        &self,
        device_ids: Vec<String>,
        payload: Payload,
        priority: Priority,
        wait: bool,
    ) -> Vec<BroadcastOutcome> {
        let futures = device_ids.into_iter().map(|device_id| {
            let payload = payload.clone();
            async move {
                let result = self
                    .submit(SubmitRequest {
                        device_id: device_id.clone(),
                        payload,
                        priority,
                        wait,
                        fail_if_offline: false,
                        source: JobSource::Broadcast,
                        idempotency_key: None,
                    })
                    .await;
                BroadcastOutcome { device_id, result }
            }
        });
        join_all(futures).await
    }

    /// Admin-triggered cancel (SPEC_FULL.md §4 supplemented feature,
    /// implementing the best-effort semantics of spec §4.9 / Design Note a).
    pub async fn cancel(&self, job_id: Uuid) -> Result<Job, DispatchError> {
        let job = self.job_store.get(job_id).await?.ok_or(DispatchError::JobNotFound(job_id))?;
        if job.state.is_terminal() {
            return Ok(job);
        }

        // Drop any not-yet-delivered copy from the server-side offline
        // queue; this is the server's half of "removes it from the Device
        // Queue" for jobs that never reached the device.
        self.offline_store.remove_by_job(job_id).await?;

        // Best-effort: ask the device to stop too, in case it already has
        // the job queued or mid-print. No abort of an in-flight write is
        // attempted (spec Design Note a).
        if self.registry.is_connected(&job.device_id).await {
            let envelope = CommandEnvelope::cancel(job_id);
            if let Err(e) = self.bus.publish_command(&job.device_id, &envelope).await {
                tracing::warn!(job_id = %job_id, error = %e, "cancel publish failed; job still marked cancelled server-side");
            }
        }

        let updated = self
            .job_store
            .apply_transition(job_id, JobState::Cancelled, None)
            .await?
            .ok_or(DispatchError::JobNotFound(job_id))?;
        self.correlation.resolve(job_id, WaitOutcome::Cancelled).await;
        Ok(updated)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, DispatchError> {
        Ok(self.job_store.get(job_id).await?)
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, DispatchError> {
        Ok(self.job_store.list(filter).await?)
    }

    /// Publish if connected; fall back to the offline queue on a connected-
    /// but-failed publish (spec §4.5 step 2, and §4.7 semantics for the
    /// transient-failure case).
    async fn route(
        &self,
        device_id: &str,
        job_id: Uuid,
        envelope: &CommandEnvelope,
        online: bool,
    ) -> Result<(), DispatchError> {
        if online {
            match self.bus.publish_command(device_id, envelope).await {
                Ok(()) => {
                    self.job_store.mark_sent(job_id).await?;
                    self.registry.increment_in_flight(device_id).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(device_id, job_id = %job_id, error = %e, "publish failed while connected, falling back to offline queue");
                }
            }
        }

        let pending = self.offline_store.count_for_device(device_id).await?;
        if pending as usize >= self.offline_capacity {
            let error = ErrorDetail::new(ErrorKind::QueueFullOffline, "server-side offline queue is full");
            self.job_store.apply_transition(job_id, JobState::Failed, Some(error)).await?;
            return Err(DispatchError::QueueFullOffline);
        }
        self.offline_store.enqueue(device_id, job_id, envelope).await?;
        Ok(())
    }
}

/// Periodic retention + expiry sweep (spec §4.8 "enforced by a periodic
/// sweep"; spec §3 "expired fires after 24h"). Runs until `shutdown` fires.
pub async fn run_sweep(
    job_store: Arc<JobStore>,
    retention_window: chrono::Duration,
    tick: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let retention_cutoff = chrono::Utc::now() - retention_window;
                match job_store.sweep_retention(retention_cutoff).await {
                    Ok(n) if n > 0 => tracing::info!(elided = n, "retention sweep elided inline payloads"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                }

                let expiry_cutoff = chrono::Utc::now() - chrono::Duration::hours(24);
                match job_store.sweep_expired(expiry_cutoff).await {
                    Ok(ids) if !ids.is_empty() => tracing::info!(count = ids.len(), "expired stale jobs past 24h lifetime"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::credential_store::CredentialStore;
    use crate::store::device_store::RegisterDevice;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn harness() -> (Dispatcher, Arc<JobStore>, Arc<BusSessionRegistry>) {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::connect_pool_for_test(&pool).await;

        let job_store = Arc::new(JobStore::new(pool.clone()));
        let offline_store = Arc::new(OfflineStore::new(pool.clone()));
        let device_store = Arc::new(DeviceStore::new(pool.clone()));
        let _credentials = CredentialStore::new(pool);
        let registry = Arc::new(BusSessionRegistry::new(Duration::from_secs(180)));
        let correlation = Arc::new(CorrelationEngine::new(Duration::from_millis(50), Duration::from_secs(30)));

        device_store
            .register(RegisterDevice {
                id: "D1".into(),
                name: "front-counter".into(),
                printer_path: "/dev/usb/lp0".into(),
                label_size: "4x6".into(),
            })
            .await
            .unwrap();

        // No real bus in unit tests: `NatsBus::connect` requires a live
        // server, so these tests exercise the offline path exclusively,
        // which never calls into the bus client.
        let bus = NatsBus::disconnected_for_test();

        let dispatcher = Dispatcher::new(
            Arc::clone(&job_store),
            offline_store,
            device_store,
            Arc::clone(&registry),
            correlation,
            bus,
            10_000,
        );
        (dispatcher, job_store, registry)
    }

    #[tokio::test]
    async fn offline_submit_without_wait_queues_and_returns_accepted() {
        let (dispatcher, job_store, _registry) = harness().await;
        let result = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: false,
                source: JobSource::Api,
                idempotency_key: None,
            })
            .await
            .unwrap();

        match result {
            SubmissionResult::Accepted { status, .. } => assert_eq!(status, JobState::Queued),
            other => panic!("expected Accepted, got {other:?}"),
        }
        let jobs = job_store.recent(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn fail_if_offline_rejects_synchronously_without_persisting() {
        let (dispatcher, job_store, _registry) = harness().await;
        let err = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: true,
                fail_if_offline: true,
                source: JobSource::Api,
                idempotency_key: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::DeviceOffline));
        assert_eq!(job_store.recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn fail_if_offline_without_wait_rejects_as_service_unavailable() {
        let (dispatcher, job_store, _registry) = harness().await;
        let err = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: true,
                source: JobSource::Api,
                idempotency_key: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::DeviceOfflineImmediate));
        assert_eq!(err.kind(), ErrorKind::DeviceOffline);
        assert_eq!(job_store.recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unknown_device_rejected() {
        let (dispatcher, _job_store, _registry) = harness().await;
        let err = dispatcher
            .submit(SubmitRequest {
                device_id: "does-not-exist".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: false,
                source: JobSource::Api,
                idempotency_key: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn idempotent_resubmit_returns_existing_job() {
        let (dispatcher, job_store, _registry) = harness().await;
        let first = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: false,
                source: JobSource::Api,
                idempotency_key: Some("order-42".into()),
            })
            .await
            .unwrap();
        let first_id = match first {
            SubmissionResult::Accepted { job_id, .. } => job_id,
            other => panic!("unexpected {other:?}"),
        };

        let second = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: false,
                source: JobSource::Api,
                idempotency_key: Some("order-42".into()),
            })
            .await
            .unwrap();
        let second_id = match second {
            SubmissionResult::Accepted { job_id, .. } => job_id,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(first_id, second_id);
        assert_eq!(job_store.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_queued_job_removes_offline_entry() {
        let (dispatcher, job_store, _registry) = harness().await;
        let result = dispatcher
            .submit(SubmitRequest {
                device_id: "D1".into(),
                payload: Payload::Inline { zpl: "^XA^XZ".into() },
                priority: Priority::default(),
                wait: false,
                fail_if_offline: false,
                source: JobSource::Api,
                idempotency_key: None,
            })
            .await
            .unwrap();
        let job_id = match result {
            SubmissionResult::Accepted { job_id, .. } => job_id,
            other => panic!("unexpected {other:?}"),
        };

        let cancelled = dispatcher.cancel(job_id).await.unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);
        let job = job_store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }
}
