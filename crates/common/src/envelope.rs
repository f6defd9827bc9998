// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Command/status envelopes carried on bus topics (spec §6).

use serde::{Deserialize, Serialize};

use crate::job::{JobState, Payload, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Print,
    TestPrint,
    Cancel,
    Reconfigure,
    Ping,
}

/// `{job_id, kind, payload?, priority, issued_at}` — the command envelope
/// published on `labelberry/pi/{D}/commands`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub job_id: uuid::Uuid,
    pub kind: CommandKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub priority: Priority,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

impl CommandEnvelope {
    pub fn print(job_id: uuid::Uuid, payload: Payload, priority: Priority) -> Self {
        Self {
            job_id,
            kind: CommandKind::Print,
            payload: Some(payload),
            priority,
            issued_at: chrono::Utc::now(),
        }
    }

    pub fn cancel(job_id: uuid::Uuid) -> Self {
        Self {
            job_id,
            kind: CommandKind::Cancel,
            payload: None,
            priority: Priority::default(),
            issued_at: chrono::Utc::now(),
        }
    }
}

/// Declared device capabilities, published on connect and on change
/// (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub printer_model: String,
    pub label_size: String,
    pub firmware_build: String,
}

/// Heartbeat/status payload published at a fixed cadence (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl StatusEnvelope {
    pub fn offline() -> Self {
        Self {
            connected: false,
            queue_depth: None,
            last_error: None,
            uptime_secs: None,
            capabilities: None,
        }
    }
}

/// The `hello` connect announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloEnvelope {
    pub device_id: String,
    pub capabilities: Capabilities,
}

/// A received command together with the device-assigned local sequencing
/// metadata the Queue needs (kept separate from the wire envelope so the
/// Queue's own bookkeeping never leaks back onto the wire).
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub envelope: CommandEnvelope,
    pub source: crate::job::JobSource,
}

/// Reconfigure command body — updates to mutable device-local settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReconfigurePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_size: Option<String>,
}

/// `new_state` observed by the Correlation Engine must be one of these;
/// kept as a thin alias so callers don't need to import `job::JobState`
/// directly when only the lifecycle shape matters.
pub type ObservedState = JobState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_envelope_roundtrip() {
        let id = uuid::Uuid::new_v4();
        let env = CommandEnvelope::print(
            id,
            Payload::Inline { zpl: "^XA^XZ".into() },
            Priority::default(),
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: CommandEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, id);
        assert_eq!(back.kind, CommandKind::Print);
    }

    #[test]
    fn status_offline_has_no_optional_fields_serialized() {
        let json = serde_json::to_value(StatusEnvelope::offline()).unwrap();
        assert_eq!(json["connected"], serde_json::json!(false));
        assert!(json.get("queue_depth").is_none());
    }
}
