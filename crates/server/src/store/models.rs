// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Row types for the durable store. Kept distinct from the wire types in
//! `labelberry-common` since the store tracks server-only bookkeeping
//! (secret hashes, elision flags) that never crosses the wire verbatim.

use chrono::{DateTime, Utc};
use labelberry_common::{ErrorDetail, JobSource, JobState, Payload, Priority};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub printer_path: String,
    pub label_size: String,
    pub printer_model: Option<String>,
    pub firmware_build: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned only at creation time (spec §3: "secret is never returned
/// after creation").
pub struct NewDeviceSecret(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub priority: Priority,
    pub source: JobSource,
    pub wait_for_completion: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub inline_elided: bool,
}
