// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Durable per-device Offline Queue entries (spec §3, §4.7).

use chrono::{DateTime, Utc};
use labelberry_common::CommandEnvelope;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::StoreError;

pub struct OfflineStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct OfflineEntry {
    pub id: Uuid,
    pub device_id: String,
    pub job_id: Uuid,
    pub envelope: CommandEnvelope,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl OfflineStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_for_device(&self, device_id: &str) -> Result<u32, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE device_id = ?")
            .bind(device_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u32)
    }

    pub async fn enqueue(&self, device_id: &str, job_id: Uuid, envelope: &CommandEnvelope) -> Result<(), StoreError> {
        let id = Uuid::new_v4();
        let envelope_json = serde_json::to_string(envelope)?;
        sqlx::query(
            "INSERT INTO offline_queue (id, device_id, job_id, envelope_json, enqueued_at, attempts) VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(id.to_string())
        .bind(device_id)
        .bind(job_id.to_string())
        .bind(envelope_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// FIFO by enqueue order for drain (spec §4.7 "Drain publishes each
    /// envelope in order").
    pub async fn list_for_device(&self, device_id: &str) -> Result<Vec<OfflineEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM offline_queue WHERE device_id = ? ORDER BY enqueued_at ASC")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offline_queue WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn remove_all_for_device(&self, device_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offline_queue WHERE device_id = ?").bind(device_id).execute(&self.pool).await?;
        Ok(())
    }

    /// Remove a pending entry by the Job it carries (spec §4.5 "Cancelling a
    /// queued Job removes it from the Device Queue" — the server-side
    /// analog when the job never reached the device).
    pub async fn remove_by_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM offline_queue WHERE job_id = ?").bind(job_id.to_string()).execute(&self.pool).await?;
        Ok(())
    }

    /// Entries older than 24h are dropped (spec §4.7 "Bounded expiry").
    pub async fn sweep_expired(&self, older_than: DateTime<Utc>) -> Result<Vec<OfflineEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM offline_queue WHERE enqueued_at < ?")
            .bind(older_than.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        let entries: Vec<OfflineEntry> = rows.into_iter().map(row_to_entry).collect::<Result<_, _>>()?;
        for entry in &entries {
            self.remove(entry.id).await?;
        }
        Ok(entries)
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<OfflineEntry, StoreError> {
    let id = Uuid::parse_str(&row.get::<String, _>("id")).map_err(|_| StoreError::NotFound)?;
    let job_id = Uuid::parse_str(&row.get::<String, _>("job_id")).map_err(|_| StoreError::NotFound)?;
    let envelope: CommandEnvelope = serde_json::from_str(&row.get::<String, _>("envelope_json"))?;
    let enqueued_at = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("enqueued_at"))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(OfflineEntry {
        id,
        device_id: row.get("device_id"),
        job_id,
        envelope,
        enqueued_at,
        attempts: row.get::<i64, _>("attempts") as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelberry_common::Priority;

    async fn test_store() -> OfflineStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::connect_pool_for_test(&pool).await;
        OfflineStore::new(pool)
    }

    #[tokio::test]
    async fn enqueue_list_fifo_remove() {
        let store = test_store().await;
        let job1 = Uuid::new_v4();
        let job2 = Uuid::new_v4();
        store.enqueue("D1", job1, &CommandEnvelope::cancel(job1)).await.unwrap();
        store.enqueue("D1", job2, &CommandEnvelope::cancel(job2)).await.unwrap();

        let entries = store.list_for_device("D1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_id, job1);
        assert_eq!(entries[1].job_id, job2);
        let _ = Priority::default();

        store.remove(entries[0].id).await.unwrap();
        assert_eq!(store.list_for_device("D1").await.unwrap().len(), 1);
    }
}
