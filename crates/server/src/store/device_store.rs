// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device CRUD (spec §3, §6). Secrets are hashed at rest and never
//! returned after creation.

use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use super::{models::NewDeviceSecret, Device, StoreError};

pub struct DeviceStore {
    pool: SqlitePool,
}

pub struct RegisterDevice {
    pub id: String,
    pub name: String,
    pub printer_path: String,
    pub label_size: String,
}

pub struct UpdateDevice {
    pub name: Option<String>,
    pub printer_path: Option<String>,
    pub label_size: Option<String>,
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_secret() -> String {
    let mut raw = [0u8; 32];
    rand::rng().fill_bytes(&mut raw);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

impl DeviceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a device; returns the record plus the plaintext secret,
    /// which the caller must surface exactly once (spec §3 invariant).
    pub async fn register(&self, req: RegisterDevice) -> Result<(Device, NewDeviceSecret), StoreError> {
        let secret = generate_secret();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO devices (id, name, secret_hash, printer_path, label_size, printer_model, firmware_build, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(&req.id)
        .bind(&req.name)
        .bind(hash_secret(&secret))
        .bind(&req.printer_path)
        .bind(&req.label_size)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let device = Device {
            id: req.id,
            name: req.name,
            printer_path: req.printer_path,
            label_size: req.label_size,
            printer_model: None,
            firmware_build: None,
            created_at: now,
            updated_at: now,
        };
        Ok((device, NewDeviceSecret(secret)))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query("SELECT * FROM devices WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_device(&r)))
    }

    pub async fn list(&self) -> Result<Vec<Device>, StoreError> {
        let rows = sqlx::query("SELECT * FROM devices ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_device).collect())
    }

    pub async fn update(&self, id: &str, update: UpdateDevice) -> Result<Option<Device>, StoreError> {
        let Some(mut device) = self.get(id).await? else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            device.name = name;
        }
        if let Some(path) = update.printer_path {
            device.printer_path = path;
        }
        if let Some(label) = update.label_size {
            device.label_size = label;
        }
        device.updated_at = Utc::now();

        sqlx::query(
            "UPDATE devices SET name = ?, printer_path = ?, label_size = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&device.name)
        .bind(&device.printer_path)
        .bind(&device.label_size)
        .bind(device.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(device))
    }

    /// Record the capability snapshot from the device's last `hello`
    /// envelope (SPEC_FULL.md §2 supplemented field).
    pub async fn record_capabilities(
        &self,
        id: &str,
        printer_model: &str,
        firmware_build: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE devices SET printer_model = ?, firmware_build = ?, updated_at = ? WHERE id = ?",
        )
        .bind(printer_model)
        .bind(firmware_build)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a device; the caller is responsible for revoking its secret
    /// from any cached auth state and evicting its Bus Session (spec §3).
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn verify_secret(&self, id: &str, secret: &str) -> Result<bool, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT secret_hash FROM devices WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        Ok(matches!(row, Some((hash,)) if hash == hash_secret(secret)))
    }
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Device {
    Device {
        id: row.get("id"),
        name: row.get("name"),
        printer_path: row.get("printer_path"),
        label_size: row.get("label_size"),
        printer_model: row.get("printer_model"),
        firmware_build: row.get("firmware_build"),
        created_at: parse_ts(row.get("created_at")),
        updated_at: parse_ts(row.get("updated_at")),
    }
}

fn parse_ts(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> DeviceStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::connect_pool_for_test(&pool).await;
        DeviceStore::new(pool)
    }

    #[tokio::test]
    async fn register_then_get() {
        let store = test_store().await;
        let (device, secret) = store
            .register(RegisterDevice {
                id: "D1".into(),
                name: "front-counter".into(),
                printer_path: "/dev/usb/lp0".into(),
                label_size: "4x6".into(),
            })
            .await
            .unwrap();
        assert_eq!(device.id, "D1");
        assert!(!secret.0.is_empty());

        let fetched = store.get("D1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "front-counter");

        assert!(store.verify_secret("D1", &secret.0).await.unwrap());
        assert!(!store.verify_secret("D1", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_device() {
        let store = test_store().await;
        store
            .register(RegisterDevice {
                id: "D2".into(),
                name: "n".into(),
                printer_path: "/dev/usb/lp0".into(),
                label_size: "4x6".into(),
            })
            .await
            .unwrap();
        assert!(store.delete("D2").await.unwrap());
        assert!(store.get("D2").await.unwrap().is_none());
    }
}
