// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Wire error taxonomy shared by server and device.
//!
//! This is the single stable vocabulary referenced by spec §7: every error
//! that crosses the HTTP or bus boundary is represented as one of these
//! kinds, both in JSON error bodies and in lifecycle envelope `error.kind`
//! fields. Server- and device-internal error types are richer and map down
//! to this enum at the wire boundary; they never invent new wire strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidRequest,
    DeviceOffline,
    QueueFull,
    QueueFullOffline,
    PrinterNotPresent,
    PrinterBusy,
    PrinterIoError,
    ZplFetchFailed,
    Timeout,
    Cancelled,
    Expired,
    CrashRecovery,
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this kind maps to when surfaced synchronously.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::InvalidRequest => 422,
            Self::DeviceOffline => 409,
            Self::QueueFull | Self::QueueFullOffline => 503,
            Self::PrinterNotPresent | Self::PrinterBusy | Self::PrinterIoError => 502,
            Self::ZplFetchFailed => 422,
            Self::Timeout => 504,
            Self::Cancelled => 409,
            Self::Expired => 410,
            Self::CrashRecovery => 502,
            Self::Internal => 500,
        }
    }

    /// The stable wire string, matching spec §7 exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::DeviceOffline => "device_offline",
            Self::QueueFull => "queue_full",
            Self::QueueFullOffline => "queue_full_offline",
            Self::PrinterNotPresent => "printer_not_present",
            Self::PrinterBusy => "printer_busy",
            Self::PrinterIoError => "printer_io_error",
            Self::ZplFetchFailed => "zpl_fetch_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::CrashRecovery => "crash_recovery",
            Self::Internal => "internal",
        }
    }

    /// True for conditions the Dispatcher retries/queues internally and
    /// never surfaces synchronously unless the caller's deadline is crossed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DeviceOffline | Self::PrinterBusy)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a Job or carried in a lifecycle envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_spec() {
        assert_eq!(ErrorKind::QueueFullOffline.as_str(), "queue_full_offline");
        assert_eq!(ErrorKind::CrashRecovery.as_str(), "crash_recovery");
        assert_eq!(ErrorKind::PrinterNotPresent.http_status(), 502);
    }

    #[test]
    fn recoverable_kinds() {
        assert!(ErrorKind::DeviceOffline.is_recoverable());
        assert!(!ErrorKind::Timeout.is_recoverable());
    }

    #[test]
    fn serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::ZplFetchFailed).unwrap();
        assert_eq!(v, serde_json::json!("zpl_fetch_failed"));
    }
}
