// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Queue-worker task: the only task allowed to touch the Printer Driver
//! (spec §5). Pulls the next eligible Job, resolves its payload to bytes,
//! calls the driver, and applies the retry/backoff/crash-recovery policy
//! from spec §4.1/§4.2.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use labelberry_common::{ErrorDetail, ErrorKind, JobState, LifecycleEvent, Payload};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SendOutcome;
use crate::printer::PrinterDriver;
use crate::queue::{DeviceQueue, QueueEntry};

/// 24h eligibility window from Job creation (spec §4.2 "Retry window").
const RETRY_WINDOW: chrono::Duration = chrono::Duration::hours(24);
const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(180);

/// Resolves a [`Payload`] to the raw ZPL bytes to send to the printer.
/// Holds an optional `reqwest::Client` so unit tests that only exercise
/// `Payload::Inline` don't need a live HTTP stack.
pub struct PayloadResolver {
    http: reqwest::Client,
}

impl PayloadResolver {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    pub async fn resolve(&self, payload: &Payload) -> Result<Vec<u8>, String> {
        match payload {
            Payload::Inline { zpl } => Ok(zpl.clone().into_bytes()),
            Payload::Url { url } => {
                let resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
                let resp = resp.error_for_status().map_err(|e| e.to_string())?;
                resp.bytes().await.map(|b| b.to_vec()).map_err(|e| e.to_string())
            }
            Payload::FileRef { path } => std::fs::read(path).map_err(|e| e.to_string()),
        }
    }
}

impl Default for PayloadResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the queue-worker loop until `shutdown` fires. Polls on a short
/// interval rather than a condvar: the queue is small and local, and this
/// keeps the worker a plain, inspectable loop like the teacher's other
/// polling tasks (e.g. `dispatch::run_sweep` on the server side).
pub async fn run(
    queue: Arc<DeviceQueue>,
    printer: Arc<PrinterDriver>,
    resolver: Arc<PayloadResolver>,
    events_tx: mpsc::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("queue-worker: shutting down");
                return;
            }
            _ = tick.tick() => {
                if let Some(entry) = queue.peek() {
                    process_one(&queue, &printer, resolver.as_ref(), &events_tx, entry).await;
                }
            }
        }
    }
}

async fn process_one(
    queue: &DeviceQueue,
    printer: &PrinterDriver,
    resolver: &PayloadResolver,
    events_tx: &mpsc::Sender<LifecycleEvent>,
    entry: QueueEntry,
) {
    let job_id = entry.job_id;
    let crash_recovery = entry.crash_recovery_pending;

    let processing = match queue.mark_processing(job_id) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("queue-worker: mark_processing({job_id}) failed: {e}");
            return;
        }
    };
    emit(events_tx, job_id, JobState::Processing, processing.attempt, None).await;

    let bytes = match resolver.resolve(&entry.payload).await {
        Ok(b) => b,
        Err(e) => {
            fail(queue, events_tx, job_id, processing.attempt, ErrorKind::ZplFetchFailed, e).await;
            return;
        }
    };

    let outcome = printer.send(&bytes).await;

    match outcome {
        SendOutcome::Ok => {
            let done = queue.ack(job_id, JobState::Completed, None).unwrap_or(processing);
            emit(events_tx, job_id, JobState::Completed, done.attempt, None).await;
        }
        SendOutcome::NotPresent => {
            // Reported to the Queue without consuming a retry: crash
            // recovery or not, a missing printer fails the job outright
            // rather than looping forever on transient wiring (spec §4.1).
            fail(queue, events_tx, job_id, processing.attempt, ErrorKind::PrinterNotPresent, "printer not present".into()).await;
        }
        SendOutcome::Busy => {
            // The driver already retried internally up to its own cap and
            // would have promoted to io_error instead of returning Busy
            // here; treat a bare Busy defensively the same as io_error.
            handle_recoverable_failure(queue, events_tx, &entry, crash_recovery, ErrorKind::PrinterBusy, "printer busy".into()).await;
        }
        SendOutcome::IoError(detail) => {
            handle_recoverable_failure(queue, events_tx, &entry, crash_recovery, ErrorKind::PrinterIoError, detail).await;
        }
    }
}

async fn handle_recoverable_failure(
    queue: &DeviceQueue,
    events_tx: &mpsc::Sender<LifecycleEvent>,
    entry: &QueueEntry,
    crash_recovery: bool,
    kind: ErrorKind,
    message: String,
) {
    let job_id = entry.job_id;

    if crash_recovery {
        fail(queue, events_tx, job_id, entry.attempt + 1, ErrorKind::CrashRecovery, message).await;
        return;
    }

    if Utc::now() - entry.created_at >= RETRY_WINDOW {
        fail(queue, events_tx, job_id, entry.attempt + 1, ErrorKind::Expired, "24h retry window exceeded".into()).await;
        return;
    }

    let backoff = backoff_for(entry.attempt);
    let next_attempt_at = Utc::now()
        + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(BACKOFF_CAP.as_secs() as i64));
    let detail = ErrorDetail { kind, message };
    match queue.reschedule(job_id, next_attempt_at, detail) {
        Ok(_) => {}
        Err(e) => tracing::warn!("queue-worker: reschedule({job_id}) failed: {e}"),
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let secs = BACKOFF_BASE.as_secs().saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    Duration::from_secs(secs).min(BACKOFF_CAP)
}

async fn fail(
    queue: &DeviceQueue,
    events_tx: &mpsc::Sender<LifecycleEvent>,
    job_id: Uuid,
    attempt: u32,
    kind: ErrorKind,
    message: String,
) {
    let detail = ErrorDetail { kind, message };
    let failed = queue.ack(job_id, JobState::Failed, Some(detail.clone()));
    let attempt = failed.map(|e| e.attempt).unwrap_or(attempt);
    emit(events_tx, job_id, JobState::Failed, attempt, Some(detail)).await;
}

async fn emit(
    events_tx: &mpsc::Sender<LifecycleEvent>,
    job_id: Uuid,
    state: JobState,
    attempt: u32,
    error: Option<ErrorDetail>,
) {
    let event = LifecycleEvent { job_id, state, at: Utc::now(), attempt, error };
    if events_tx.send(event).await.is_err() {
        tracing::debug!("queue-worker: lifecycle event receiver dropped");
    }
}
