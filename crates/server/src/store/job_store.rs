// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Server-Side Job Store (spec §4.8). Durable record of jobs and their
//! terminal outcomes; enforces the retention window and supplies history
//! views.

use chrono::{DateTime, Utc};
use labelberry_common::{ErrorDetail, ErrorKind, JobSource, JobState, Payload, Priority};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{models::Job, StoreError};

pub struct JobStore {
    pool: SqlitePool,
}

pub struct NewJob {
    pub id: Uuid,
    pub device_id: String,
    pub payload: Payload,
    pub priority: Priority,
    pub source: JobSource,
    pub wait_for_completion: bool,
    pub correlation_id: Option<String>,
}

pub struct JobFilter {
    pub device_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub status: Option<JobState>,
    pub limit: u32,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a Job in `queued` state with `attempt_count = 0` (spec §4.5 step 1).
    pub async fn create(&self, job: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let payload_json = serde_json::to_string(&job.payload)?;

        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, device_id, payload_json, priority, source, wait_for_completion,
                 created_at, started_at, completed_at, attempt_count, state,
                 error_kind, error_message, correlation_id, inline_elided)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, 0, 'queued', NULL, NULL, ?, 0)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.device_id)
        .bind(&payload_json)
        .bind(job.priority.get())
        .bind(source_str(job.source))
        .bind(job.wait_for_completion)
        .bind(now.to_rfc3339())
        .bind(&job.correlation_id)
        .execute(&self.pool)
        .await?;

        Ok(Job {
            id: job.id,
            device_id: job.device_id,
            payload: Some(job.payload),
            priority: job.priority,
            source: job.source,
            wait_for_completion: job.wait_for_completion,
            created_at: now,
            started_at: None,
            completed_at: None,
            attempt_count: 0,
            state: JobState::Queued,
            error: None,
            correlation_id: job.correlation_id,
            inline_elided: false,
        })
    }

    /// Find an existing Job by its caller-supplied idempotency key on a
    /// given device (spec §4.5 "Idempotency").
    pub async fn find_by_correlation(
        &self,
        device_id: &str,
        correlation_id: &str,
    ) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE device_id = ? AND correlation_id = ?")
            .bind(device_id)
            .bind(correlation_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?").bind(id.to_string()).fetch_optional(&self.pool).await?;
        row.map(row_to_job).transpose()
    }

    /// Transition `sent` after a successful bus publish (spec §4.5 step 2).
    pub async fn mark_sent(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET state = 'sent', attempt_count = attempt_count + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a lifecycle transition reported by the device (spec §4.6).
    /// No-op (and logged) if the transition would violate monotonicity.
    pub async fn apply_transition(
        &self,
        id: Uuid,
        next: JobState,
        error: Option<ErrorDetail>,
    ) -> Result<Option<Job>, StoreError> {
        let Some(job) = self.get(id).await? else { return Ok(None) };
        if !job.state.can_transition_to(next) {
            tracing::warn!(job_id = %id, from = %job.state, to = %next, "rejecting non-monotone job transition");
            return Ok(Some(job));
        }

        let now = Utc::now();
        let started_at = if next == JobState::Processing && job.started_at.is_none() {
            Some(now)
        } else {
            job.started_at
        };
        let completed_at = if next.is_terminal() { Some(now) } else { None };

        sqlx::query(
            "UPDATE jobs SET state = ?, started_at = ?, completed_at = ?, error_kind = ?, error_message = ? WHERE id = ?",
        )
        .bind(next.to_string())
        .bind(started_at.map(|d| d.to_rfc3339()))
        .bind(completed_at.map(|d| d.to_rfc3339()))
        .bind(error.as_ref().map(|e| e.kind.as_str()))
        .bind(error.as_ref().map(|e| e.message.clone()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1=1");
        if filter.device_id.is_some() {
            sql.push_str(" AND device_id = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND state = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(ref device_id) = filter.device_id {
            query = query.bind(device_id);
        }
        if let Some(since) = filter.since {
            query = query.bind(since.to_rfc3339());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        query = query.bind(filter.limit.min(1000));

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        self.list(JobFilter { device_id: None, since: None, status: None, limit }).await
    }

    /// Retention sweep (spec §4.8): elide inline ZPL payloads older than the
    /// retention window; metadata and terminal state are retained.
    pub async fn sweep_retention(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET payload_json = NULL, inline_elided = 1 WHERE created_at < ? AND inline_elided = 0 AND payload_json IS NOT NULL",
        )
        .bind(older_than.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Expire non-terminal jobs that have exceeded the 24h lifetime
    /// (spec §3, §4.9).
    pub async fn sweep_expired(&self, older_than: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM jobs WHERE created_at < ? AND state NOT IN ('completed','failed','cancelled','expired')",
        )
        .bind(older_than.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let id_str: String = row.get("id");
            if let Ok(id) = Uuid::parse_str(&id_str) {
                self.apply_transition(
                    id,
                    JobState::Expired,
                    Some(ErrorDetail::new(ErrorKind::Expired, "24h lifetime exceeded")),
                )
                .await?;
                expired.push(id);
            }
        }
        Ok(expired)
    }
}

fn source_str(s: JobSource) -> &'static str {
    match s {
        JobSource::Api => "api",
        JobSource::Direct => "direct",
        JobSource::Broadcast => "broadcast",
        JobSource::Test => "test",
    }
}

fn parse_source(s: &str) -> JobSource {
    match s {
        "direct" => JobSource::Direct,
        "broadcast" => JobSource::Broadcast,
        "test" => JobSource::Test,
        _ => JobSource::Api,
    }
}

fn parse_state(s: &str) -> JobState {
    match s {
        "sent" => JobState::Sent,
        "processing" => JobState::Processing,
        "completed" => JobState::Completed,
        "failed" => JobState::Failed,
        "cancelled" => JobState::Cancelled,
        "expired" => JobState::Expired,
        _ => JobState::Queued,
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str).map_err(|_| StoreError::NotFound)?;

    let payload_json: Option<String> = row.get("payload_json");
    let payload: Option<Payload> = match payload_json {
        Some(s) => serde_json::from_str::<Value>(&s).ok().and_then(|v| serde_json::from_value(v).ok()),
        None => None,
    };

    let error_kind: Option<String> = row.get("error_kind");
    let error_message: Option<String> = row.get("error_message");
    let error = error_kind.map(|k| {
        let kind = match k.as_str() {
            "not_found" => ErrorKind::NotFound,
            "invalid_request" => ErrorKind::InvalidRequest,
            "device_offline" => ErrorKind::DeviceOffline,
            "queue_full" => ErrorKind::QueueFull,
            "queue_full_offline" => ErrorKind::QueueFullOffline,
            "printer_not_present" => ErrorKind::PrinterNotPresent,
            "printer_busy" => ErrorKind::PrinterBusy,
            "printer_io_error" => ErrorKind::PrinterIoError,
            "zpl_fetch_failed" => ErrorKind::ZplFetchFailed,
            "timeout" => ErrorKind::Timeout,
            "cancelled" => ErrorKind::Cancelled,
            "expired" => ErrorKind::Expired,
            "crash_recovery" => ErrorKind::CrashRecovery,
            "unauthorized" => ErrorKind::Unauthorized,
            _ => ErrorKind::Internal,
        };
        ErrorDetail::new(kind, error_message.unwrap_or_default())
    });

    let priority_raw: i64 = row.get("priority");
    let priority = Priority::new(priority_raw as u8).unwrap_or_default();

    let started_at: Option<String> = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Job {
        id,
        device_id: row.get("device_id"),
        payload,
        priority,
        source: parse_source(&row.get::<String, _>("source")),
        wait_for_completion: row.get("wait_for_completion"),
        created_at: parse_rfc3339(row.get("created_at")),
        started_at: started_at.map(parse_rfc3339),
        completed_at: completed_at.map(parse_rfc3339),
        attempt_count: row.get::<i64, _>("attempt_count") as u32,
        state: parse_state(&row.get::<String, _>("state")),
        error,
        correlation_id: row.get("correlation_id"),
        inline_elided: row.get("inline_elided"),
    })
}

fn parse_rfc3339(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> JobStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::connect_pool_for_test(&pool).await;
        JobStore::new(pool)
    }

    fn sample_job(id: Uuid, device_id: &str) -> NewJob {
        NewJob {
            id,
            device_id: device_id.to_owned(),
            payload: Payload::Inline { zpl: "^XA^XZ".into() },
            priority: Priority::default(),
            source: JobSource::Api,
            wait_for_completion: true,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn create_then_transition_lifecycle() {
        let store = test_store().await;
        let id = Uuid::new_v4();
        let job = store.create(sample_job(id, "D1")).await.unwrap();
        assert_eq!(job.state, JobState::Queued);

        store.mark_sent(id).await.unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Sent);
        assert_eq!(job.attempt_count, 1);

        store.apply_transition(id, JobState::Processing, None).await.unwrap();
        let job = store.apply_transition(id, JobState::Completed, None).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn rejects_back_transition() {
        let store = test_store().await;
        let id = Uuid::new_v4();
        store.create(sample_job(id, "D1")).await.unwrap();
        store.mark_sent(id).await.unwrap();
        store.apply_transition(id, JobState::Processing, None).await.unwrap();
        store.apply_transition(id, JobState::Completed, None).await.unwrap();

        // Completed is terminal; a later "processing" must not move it back.
        let job = store.apply_transition(id, JobState::Processing, None).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn retention_sweep_elides_payload_but_keeps_job() {
        let store = test_store().await;
        let id = Uuid::new_v4();
        store.create(sample_job(id, "D1")).await.unwrap();

        let swept = store.sweep_retention(Utc::now() + chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(swept, 1);

        let job = store.get(id).await.unwrap().unwrap();
        assert!(job.payload.is_none());
        assert!(job.inline_elided);
        assert_eq!(job.state, JobState::Queued);
    }

    #[tokio::test]
    async fn expiry_sweep_marks_stale_non_terminal_jobs() {
        let store = test_store().await;
        let id = Uuid::new_v4();
        store.create(sample_job(id, "D1")).await.unwrap();

        let expired = store.sweep_expired(Utc::now() + chrono::Duration::hours(25)).await.unwrap();
        assert_eq!(expired, vec![id]);
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Expired);
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let store = test_store().await;
        let id1 = Uuid::new_v4();
        store.create(sample_job(id1, "D1")).await.unwrap();
        let id2 = Uuid::new_v4();
        store.create(sample_job(id2, "D1")).await.unwrap();

        let jobs = store.list(JobFilter { device_id: Some("D1".into()), since: None, status: None, limit: 10 }).await.unwrap();
        assert_eq!(jobs.len(), 2);
    }
}
