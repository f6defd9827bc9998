// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Server-internal error types. Each maps to the shared wire `ErrorKind`
//! from `labelberry-common` at the HTTP boundary, following the teacher's
//! per-crate error-type convention (rich internally, one stable vocabulary
//! on the wire).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use labelberry_common::ErrorKind;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("job not found: {0}")]
    JobNotFound(uuid::Uuid),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("device offline and caller required immediate delivery")]
    DeviceOffline,
    /// Distinct from [`Self::DeviceOffline`]'s `409`: the caller didn't ask
    /// to wait for completion at all (`wait_for_completion=false`) but set
    /// `fail_if_offline`, so there is no synchronous conflict to report —
    /// just "can't deliver right now" (spec §6 response table `503` row).
    #[error("device offline, immediate delivery required")]
    DeviceOfflineImmediate,
    #[error("server-side offline queue is full")]
    QueueFullOffline,
    #[error("waiter deadline exceeded")]
    Timeout,
    #[error("job cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::DeviceNotFound(_) | Self::JobNotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::DeviceOffline | Self::DeviceOfflineImmediate => ErrorKind::DeviceOffline,
            Self::QueueFullOffline => ErrorKind::QueueFullOffline,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        // `DeviceOfflineImmediate` shares `DeviceOffline`'s wire `ErrorKind`
        // (spec §7 has one `device_offline` taxonomy entry) but a different
        // HTTP status (spec §6 response table's separate `409`/`503` rows).
        let status = match &self {
            Self::DeviceOfflineImmediate => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        };
        if matches!(kind, ErrorKind::Internal) {
            tracing::error!(error = %self, "internal error surfaced to caller");
        }
        let body = ErrorResponse { error: ErrorBody { code: kind.as_str(), message: self.to_string() } };
        (status, Json(body)).into_response()
    }
}
