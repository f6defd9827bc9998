// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Connection pool setup and schema bootstrap.
//!
//! The spec requires only transactions and indexed lookup by id and by
//! device-id+created-at (spec §3 "Ownership"). SQLite via `sqlx` satisfies
//! that without pulling in an external database service, while keeping the
//! same `sqlx::SqlitePool` shape a Postgres-backed deployment would use —
//! see DESIGN.md for the Open Question this resolves.

use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(10).connect_with(opts).await?;
    run_schema(&pool).await?;
    Ok(pool)
}

/// Run schema bootstrap against an already-open pool (used by tests with
/// `sqlite::memory:`, where `connect` would open an unrelated connection).
#[cfg(test)]
pub async fn connect_pool_for_test(pool: &SqlitePool) {
    run_schema(pool).await.expect("schema bootstrap");
}

async fn run_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            secret_hash TEXT NOT NULL,
            printer_path TEXT NOT NULL,
            label_size TEXT NOT NULL,
            printer_model TEXT,
            firmware_build TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            payload_json TEXT,
            priority INTEGER NOT NULL,
            source TEXT NOT NULL,
            wait_for_completion INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            attempt_count INTEGER NOT NULL,
            state TEXT NOT NULL,
            error_kind TEXT,
            error_message TEXT,
            correlation_id TEXT,
            inline_elided INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_device_created ON jobs(device_id, created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_device_correlation ON jobs(device_id, correlation_id) WHERE correlation_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_credentials (
            token_hash TEXT PRIMARY KEY,
            prefix TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_used_at TEXT,
            active INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offline_queue (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            job_id TEXT NOT NULL,
            envelope_json TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offline_device_enqueued ON offline_queue(device_id, enqueued_at)")
        .execute(pool)
        .await?;

    Ok(())
}
