// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Durable server-side state: Devices, Jobs, API Credentials, and the
//! Offline Queue's persisted entries (spec §3 "Ownership").

pub mod credential_store;
pub mod device_store;
pub mod job_store;
pub mod models;
pub mod offline_store;

pub use credential_store::CredentialStore;
pub use device_store::DeviceStore;
pub use job_store::JobStore;
pub use models::{Device, Job};
pub use offline_store::OfflineStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
