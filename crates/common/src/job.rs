// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Job state machine, payload union, and priority — the wire-shared shape
//! of spec §3/§4.9. Kept transport-agnostic so both server and device can
//! depend on the identical definitions.

use serde::{Deserialize, Serialize};

use crate::error::ErrorDetail;

/// `[1..10]`; higher runs first. Invalid values are rejected at the
/// Dispatcher boundary (spec §4.5 preconditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(u8);

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
pub const PRIORITY_DEFAULT: u8 = 5;

impl Priority {
    pub fn new(value: u8) -> Option<Self> {
        (PRIORITY_MIN..=PRIORITY_MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(PRIORITY_DEFAULT)
    }
}

/// Exactly one of `inline`, `url`, or `file_ref` (spec §3 Job invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Inline { zpl: String },
    Url { url: String },
    FileRef { path: String },
}

impl Payload {
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Inline { zpl } => !zpl.is_empty(),
            Self::Url { url } => !url.is_empty(),
            Self::FileRef { path } => !path.is_empty(),
        }
    }
}

/// `source` tag on a Job (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Api,
    Direct,
    Broadcast,
    Test,
}

/// Terminal/non-terminal states of the per-Job state machine (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Sent,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Expired)
    }

    /// Whether `self -> next` is a legal edge in the diagram in spec §4.9.
    /// Used by both the device Queue (which only emits monotone transitions)
    /// and the server Job Store (which enforces monotone persistence).
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Queued, Sent) => true,
            (Queued, Cancelled) => true,
            (Queued, Expired) => true,
            (Sent, Processing) => true,
            (Sent, Failed) => true,
            (Sent, Cancelled) => true,
            (Sent, Expired) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Processing, Cancelled) => true,
            (Processing, Expired) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A lifecycle transition as observed on the bus or by the device Queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub job_id: uuid::Uuid,
    pub state: JobState,
    pub at: chrono::DateTime<chrono::Utc>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_range() {
        assert!(Priority::new(0).is_none());
        assert!(Priority::new(11).is_none());
        assert_eq!(Priority::new(5).map(Priority::get), Some(5));
    }

    #[test]
    fn monotone_state_machine_rejects_back_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::Sent));
        assert!(!JobState::Sent.can_transition_to(JobState::Queued));
        assert!(!JobState::Completed.can_transition_to(JobState::Processing));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for s in [JobState::Completed, JobState::Failed, JobState::Cancelled, JobState::Expired] {
            assert!(s.is_terminal());
            for t in [JobState::Queued, JobState::Sent, JobState::Processing] {
                assert!(!s.can_transition_to(t));
            }
        }
    }

    #[test]
    fn payload_validity() {
        assert!(Payload::Inline { zpl: "^XA^XZ".into() }.is_valid());
        assert!(!Payload::Inline { zpl: String::new() }.is_valid());
    }
}
