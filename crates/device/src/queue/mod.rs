// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device Job Queue (spec §4.2): `enqueue`, `peek`, `ack`, `cancel`,
//! `size`, `snapshot`. Strict priority with FIFO tie-break; bounded
//! capacity; idempotent enqueue by job id; durable via [`journal`].

mod journal;
pub mod worker;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use labelberry_common::{ErrorDetail, JobSource, JobState, Payload, Priority};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// One Job as tracked by the device-local Queue. Mirrors the server's
/// `store::Job` shape but kept independent: the device never depends on
/// the server crate, and the journal format is its own on-disk contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub payload: Payload,
    pub priority: Priority,
    pub source: JobSource,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    pub attempt: u32,
    pub last_error: Option<ErrorDetail>,
    /// Set when this entry was found `processing` in the journal at
    /// startup: the queue-worker gets exactly one more attempt before
    /// declaring `crash_recovery` (spec §4.2).
    pub crash_recovery_pending: bool,
    /// Earliest time the worker should retry after an `io_error` (spec
    /// §4.2 "exponential backoff starting at ~5s and capped at a few
    /// minutes"). `None` means eligible immediately.
    pub next_attempt_at: Option<DateTime<Utc>>,
    seq: u64,
}

pub struct DeviceQueue {
    entries: Mutex<Vec<QueueEntry>>,
    capacity: usize,
    journal_path: PathBuf,
    next_seq: AtomicU64,
}

impl DeviceQueue {
    /// Restore the queue from the journal at `journal_path` (spec §4.2
    /// "restored at device startup from a local file"). Any entry found in
    /// `processing` is reset to `queued` with `crash_recovery_pending` set,
    /// so the worker retries it exactly once before giving up.
    pub fn load(capacity: usize, journal_path: PathBuf) -> Result<Self, QueueError> {
        let mut loaded = journal::load(&journal_path)?;
        for entry in &mut loaded.entries {
            if entry.state == JobState::Processing {
                entry.state = JobState::Queued;
                entry.crash_recovery_pending = true;
            }
        }

        Ok(Self {
            entries: Mutex::new(loaded.entries),
            capacity,
            journal_path,
            next_seq: AtomicU64::new(loaded.next_seq),
        })
    }

    /// Enqueue a new Job. Idempotent by `job_id`: if already present,
    /// returns the existing entry instead of adding a duplicate
    /// (spec §4.2 "Deduplication").
    pub fn enqueue(
        &self,
        job_id: Uuid,
        payload: Payload,
        priority: Priority,
        source: JobSource,
    ) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.iter().find(|e| e.job_id == job_id) {
            return Ok(existing.clone());
        }

        let active = entries.iter().filter(|e| !e.state.is_terminal()).count();
        if active >= self.capacity {
            return Err(QueueError::Full);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = QueueEntry {
            job_id,
            payload,
            priority,
            source,
            created_at: Utc::now(),
            state: JobState::Queued,
            attempt: 0,
            last_error: None,
            crash_recovery_pending: false,
            next_attempt_at: None,
            seq,
        };
        entries.push(entry.clone());
        self.persist(&entries)?;
        Ok(entry)
    }

    /// Next Job to dispatch: highest priority, earliest `seq` on ties,
    /// among entries still `queued` (spec §4.2 "Ordering"). A job already
    /// being transmitted stays `processing` and isn't returned again —
    /// the caller (queue-worker) holds the single in-flight slot.
    pub fn peek(&self) -> Option<QueueEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        entries
            .iter()
            .filter(|e| e.state == JobState::Queued && e.next_attempt_at.map(|t| t <= now).unwrap_or(true))
            .max_by_key(|e| (e.priority, std::cmp::Reverse(e.seq)))
            .cloned()
    }

    /// 1-indexed position of `job_id` among currently-queued entries in
    /// dispatch order, for the local HTTP surface's `queue_position`
    /// response field (spec §6).
    pub fn queue_position(&self, job_id: Uuid) -> Option<usize> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut queued: Vec<&QueueEntry> = entries.iter().filter(|e| e.state == JobState::Queued).collect();
        queued.sort_by_key(|e| (std::cmp::Reverse(e.priority), e.seq));
        queued.iter().position(|e| e.job_id == job_id).map(|i| i + 1)
    }

    /// Mark `job_id` as having been picked up for transmission.
    pub fn mark_processing(&self, job_id: Uuid) -> Result<QueueEntry, QueueError> {
        self.transition(job_id, JobState::Processing, None, true)
    }

    /// Record the outcome of a transmission attempt.
    pub fn ack(&self, job_id: Uuid, outcome: JobState, error: Option<ErrorDetail>) -> Result<QueueEntry, QueueError> {
        self.transition(job_id, outcome, error, false)
    }

    /// Return `job_id` to `queued` after a recoverable `io_error`, not due
    /// for another attempt until `next_attempt_at` (spec §4.2 "Retry
    /// window"). Does not enforce the Job state machine's monotonicity
    /// since `processing -> queued` is an internal worker retry, not an
    /// observable lifecycle transition.
    pub fn reschedule(&self, job_id: Uuid, next_attempt_at: DateTime<Utc>, error: ErrorDetail) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.iter_mut().find(|e| e.job_id == job_id).ok_or(QueueError::NotFound)?;
        entry.state = JobState::Queued;
        entry.last_error = Some(error);
        entry.next_attempt_at = Some(next_attempt_at);
        let result = entry.clone();
        self.persist(&entries)?;
        Ok(result)
    }

    pub fn cancel(&self, job_id: Uuid) -> Result<QueueEntry, QueueError> {
        self.transition(job_id, JobState::Cancelled, None, false)
    }

    fn transition(
        &self,
        job_id: Uuid,
        next: JobState,
        error: Option<ErrorDetail>,
        bump_attempt: bool,
    ) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.iter_mut().find(|e| e.job_id == job_id).ok_or(QueueError::NotFound)?;

        if entry.state.can_transition_to(next) {
            entry.state = next;
            entry.last_error = error;
            if bump_attempt {
                entry.attempt += 1;
            }
        }
        let result = entry.clone();
        self.persist(&entries)?;
        Ok(result)
    }

    /// Count of non-terminal entries (queue depth reported in status/heartbeat).
    pub fn size(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|e| !e.state.is_terminal()).count()
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn persist(&self, entries: &[QueueEntry]) -> Result<(), QueueError> {
        let journal = journal::Journal {
            entries: entries.to_vec(),
            next_seq: self.next_seq.load(Ordering::SeqCst),
        };
        journal::save(&self.journal_path, &journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> (DeviceQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.json");
        (DeviceQueue::load(capacity, path).expect("load"), dir)
    }

    #[test]
    fn enqueue_is_idempotent_by_job_id() -> anyhow::Result<()> {
        let (q, _dir) = queue(10);
        let id = Uuid::new_v4();
        let a = q.enqueue(id, Payload::Inline { zpl: "^XA^XZ".into() }, Priority::default(), JobSource::Direct)?;
        let b = q.enqueue(id, Payload::Inline { zpl: "^XA^XZ".into() }, Priority::default(), JobSource::Direct)?;
        assert_eq!(a.job_id, b.job_id);
        assert_eq!(q.size(), 1);
        Ok(())
    }

    #[test]
    fn full_queue_rejects_enqueue() -> anyhow::Result<()> {
        let (q, _dir) = queue(1);
        q.enqueue(Uuid::new_v4(), Payload::Inline { zpl: "a".into() }, Priority::default(), JobSource::Direct)?;
        let err = q.enqueue(Uuid::new_v4(), Payload::Inline { zpl: "b".into() }, Priority::default(), JobSource::Direct);
        assert!(matches!(err, Err(QueueError::Full)));
        Ok(())
    }

    #[test]
    fn peek_prefers_higher_priority_then_fifo() -> anyhow::Result<()> {
        let (q, _dir) = queue(10);
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        q.enqueue(low, Payload::Inline { zpl: "a".into() }, Priority::new(3).ok_or_else(|| anyhow::anyhow!("bad priority"))?, JobSource::Direct)?;
        q.enqueue(high, Payload::Inline { zpl: "b".into() }, Priority::new(8).ok_or_else(|| anyhow::anyhow!("bad priority"))?, JobSource::Direct)?;

        let next = q.peek().ok_or_else(|| anyhow::anyhow!("expected a queued entry"))?;
        assert_eq!(next.job_id, high);
        Ok(())
    }

    #[test]
    fn fifo_tie_break_on_equal_priority() -> anyhow::Result<()> {
        let (q, _dir) = queue(10);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        q.enqueue(first, Payload::Inline { zpl: "a".into() }, Priority::default(), JobSource::Direct)?;
        q.enqueue(second, Payload::Inline { zpl: "b".into() }, Priority::default(), JobSource::Direct)?;

        let next = q.peek().ok_or_else(|| anyhow::anyhow!("expected a queued entry"))?;
        assert_eq!(next.job_id, first);
        Ok(())
    }

    #[test]
    fn queue_position_reflects_priority_order() -> anyhow::Result<()> {
        let (q, _dir) = queue(10);
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        q.enqueue(low, Payload::Inline { zpl: "a".into() }, Priority::new(3).ok_or_else(|| anyhow::anyhow!("bad priority"))?, JobSource::Direct)?;
        q.enqueue(high, Payload::Inline { zpl: "b".into() }, Priority::new(8).ok_or_else(|| anyhow::anyhow!("bad priority"))?, JobSource::Direct)?;

        assert_eq!(q.queue_position(high), Some(1));
        assert_eq!(q.queue_position(low), Some(2));
        Ok(())
    }

    #[test]
    fn reloading_journal_resumes_processing_as_crash_recovery() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("queue.json");
        let id = Uuid::new_v4();
        {
            let q = DeviceQueue::load(10, path.clone())?;
            q.enqueue(id, Payload::Inline { zpl: "a".into() }, Priority::default(), JobSource::Direct)?;
            q.mark_processing(id)?;
        }

        let reloaded = DeviceQueue::load(10, path)?;
        let entry = reloaded.snapshot().into_iter().find(|e| e.job_id == id).ok_or_else(|| anyhow::anyhow!("entry missing"))?;
        assert_eq!(entry.state, JobState::Queued);
        assert!(entry.crash_recovery_pending);
        Ok(())
    }

    #[test]
    fn monotone_transitions_are_enforced() -> anyhow::Result<()> {
        let (q, _dir) = queue(10);
        let id = Uuid::new_v4();
        q.enqueue(id, Payload::Inline { zpl: "a".into() }, Priority::default(), JobSource::Direct)?;
        q.mark_processing(id)?;
        let completed = q.ack(id, JobState::Completed, None)?;
        assert_eq!(completed.state, JobState::Completed);

        // Terminal states reject further transitions silently (matches the
        // server Job Store's no-op-on-violation policy).
        let unchanged = q.ack(id, JobState::Processing, None)?;
        assert_eq!(unchanged.state, JobState::Completed);
        Ok(())
    }
}
