// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Local HTTP surface for same-LAN direct submission (spec §4.3/§6): a
//! bounded set of endpoints backed by the same Queue and events as the
//! bus-driven path, `source = direct`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use labelberry_common::{ErrorDetail, ErrorKind, JobSource, Payload, Priority};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::state::DeviceState;

pub fn build_router(state: Arc<DeviceState>) -> Router {
    Router::new()
        .route("/print", axum::routing::post(print))
        .route("/test-print", axum::routing::post(test_print))
        .route("/status", axum::routing::get(status))
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
pub struct PrintRequest {
    pub zpl_raw: Option<String>,
    pub zpl_url: Option<String>,
    pub priority: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct PrintResponse {
    pub job_id: Uuid,
    pub queue_position: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

fn bad_request(message: impl Into<String>) -> Response {
    let detail = ErrorDetail { kind: ErrorKind::InvalidRequest, message: message.into() };
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { error: detail })).into_response()
}

fn queue_full() -> Response {
    let detail = ErrorDetail { kind: ErrorKind::QueueFull, message: "local queue is full".into() };
    (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: detail })).into_response()
}

/// `POST /print` — enqueue locally, `source = direct` (spec §6).
pub async fn print(State(state): State<Arc<DeviceState>>, Json(req): Json<PrintRequest>) -> Response {
    enqueue(state, req, JobSource::Direct).await
}

/// `POST /test-print` — enqueue a canned label, `source = test` (spec §6).
pub async fn test_print(State(state): State<Arc<DeviceState>>) -> Response {
    enqueue(
        state,
        PrintRequest {
            zpl_raw: Some("^XA^FO50,50^A0N,40,40^FDLabelBerry test print^FS^XZ".into()),
            zpl_url: None,
            priority: None,
        },
        JobSource::Test,
    )
    .await
}

async fn enqueue(state: Arc<DeviceState>, req: PrintRequest, source: JobSource) -> Response {
    let payload = match (req.zpl_raw, req.zpl_url) {
        (Some(zpl), None) => Payload::Inline { zpl },
        (None, Some(url)) => Payload::Url { url },
        (None, None) => return bad_request("one of zpl_raw or zpl_url is required"),
        (Some(_), Some(_)) => return bad_request("zpl_raw and zpl_url are mutually exclusive"),
    };
    if !payload.is_valid() {
        return bad_request("payload must be non-empty");
    }

    let priority = match req.priority {
        None => Priority::default(),
        Some(v) => match Priority::new(v) {
            Some(p) => p,
            None => return bad_request("priority must be in 1..=10"),
        },
    };

    let job_id = Uuid::new_v4();
    match state.queue.enqueue(job_id, payload, priority, source) {
        Ok(entry) => {
            let queue_position = state.queue.queue_position(entry.job_id);
            (StatusCode::ACCEPTED, Json(PrintResponse { job_id: entry.job_id, queue_position })).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "local /print enqueue failed");
            queue_full()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queue_depth: u32,
    pub current_job: Option<Uuid>,
    pub last_error: Option<String>,
    pub uptime_secs: u64,
}

/// `GET /status` — queue depth, current job, last error (spec §6).
pub async fn status(State(state): State<Arc<DeviceState>>) -> Json<StatusResponse> {
    let snapshot = state.queue.snapshot();
    let current_job = snapshot
        .iter()
        .find(|e| e.state == labelberry_common::JobState::Processing)
        .map(|e| e.job_id);

    Json(StatusResponse {
        queue_depth: state.queue.size() as u32,
        current_job,
        last_error: state.last_error.lock().await.clone(),
        uptime_secs: state.uptime_secs(),
    })
}

/// `GET /health` — liveness (spec §6).
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::DeviceConfig;
    use crate::queue::DeviceQueue;

    fn state() -> anyhow::Result<(Arc<DeviceState>, tempfile::TempDir)> {
        let dir = tempfile::tempdir()?;
        let queue = Arc::new(DeviceQueue::load(10, dir.path().join("queue.json"))?);
        let (tx, _rx) = mpsc::channel(8);
        let config = <DeviceConfig as clap::Parser>::parse_from(["labelberry-device"]);
        Ok((Arc::new(DeviceState::new(config, queue, tx, CancellationToken::new())), dir))
    }

    #[tokio::test]
    async fn print_enqueues_and_reports_position() -> anyhow::Result<()> {
        let (state, _dir) = state()?;
        let resp =
            enqueue(Arc::clone(&state), PrintRequest { zpl_raw: Some("^XA^XZ".into()), ..Default::default() }, JobSource::Direct)
                .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(state.queue.size(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn print_rejects_empty_body() -> anyhow::Result<()> {
        let (state, _dir) = state()?;
        let resp = enqueue(state, PrintRequest::default(), JobSource::Direct).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        Ok(())
    }

    #[tokio::test]
    async fn status_reports_queue_depth() -> anyhow::Result<()> {
        let (state, _dir) = state()?;
        enqueue(Arc::clone(&state), PrintRequest { zpl_raw: Some("^XA^XZ".into()), ..Default::default() }, JobSource::Direct)
            .await;
        let Json(body) = status(State(state)).await;
        assert_eq!(body.queue_depth, 1);
        Ok(())
    }
}
