// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Print submission, recent-jobs history, and job detail/cancel (spec §6
//! rows six and seven, plus the SPEC_FULL.md §4 admin cancel action).

use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use labelberry_common::{JobSource, JobState, Payload, Priority};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::{SubmissionResult, SubmitRequest};
use crate::error::DispatchError;
use crate::state::AppState;
use crate::store::job_store::JobFilter;
use crate::store::Job;

/// JSON body for `POST /api/pis/{id}/print` (spec §6 "Print submission
/// body"). Exactly one of `zpl_raw`/`zpl_url` must be set for JSON
/// submissions; `multipart/form-data` submissions go through
/// [`submit_print_multipart`] instead.
#[derive(Debug, Deserialize, Default)]
pub struct PrintRequest {
    pub zpl_raw: Option<String>,
    pub zpl_url: Option<String>,
    pub priority: Option<u8>,
    #[serde(default = "default_wait")]
    pub wait_for_completion: bool,
    /// Reject with `409`/`503` instead of offline-queueing (spec §6 response table).
    #[serde(default)]
    pub fail_if_offline: bool,
    pub idempotency_key: Option<String>,
}

fn default_wait() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct PrintResponse {
    pub job_id: Uuid,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<labelberry_common::ErrorDetail>,
}

fn payload_from_request(req: &PrintRequest) -> Result<Payload, DispatchError> {
    match (&req.zpl_raw, &req.zpl_url) {
        (Some(zpl), None) => Ok(Payload::Inline { zpl: zpl.clone() }),
        (None, Some(url)) => Ok(Payload::Url { url: url.clone() }),
        (None, None) => Err(DispatchError::InvalidRequest("one of zpl_raw or zpl_url is required".into())),
        (Some(_), Some(_)) => Err(DispatchError::InvalidRequest("zpl_raw and zpl_url are mutually exclusive".into())),
    }
}

fn priority_from(raw: Option<u8>) -> Result<Priority, DispatchError> {
    match raw {
        None => Ok(Priority::default()),
        Some(v) => Priority::new(v).ok_or_else(|| DispatchError::InvalidRequest("priority must be in 1..=10".into())),
    }
}

/// Maps a `SubmissionResult` to the exact status/body pairing in spec §6's
/// response table. `Timeout` still reports the Job's last-known state: the
/// waiter gave up, but the Job itself keeps running (spec §4.5 step 4).
async fn submission_response(state: &AppState, result: SubmissionResult) -> Response {
    match result {
        SubmissionResult::Accepted { job_id, status } => {
            (StatusCode::ACCEPTED, Json(PrintResponse { job_id, status, error: None })).into_response()
        }
        SubmissionResult::Completed { job_id } => {
            (StatusCode::OK, Json(PrintResponse { job_id, status: JobState::Completed, error: None })).into_response()
        }
        SubmissionResult::Failed { job_id, error } => {
            // Spec §6 response table / scenario S5: a synchronous caller
            // must see an HTTP error, not a 200, when the device reports
            // the Job failed. Map through the same taxonomy the async
            // error path uses (spec §7 `ErrorKind::http_status`).
            let status = StatusCode::from_u16(error.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(PrintResponse { job_id, status: JobState::Failed, error: Some(error) })).into_response()
        }
        SubmissionResult::Cancelled { job_id } => {
            (StatusCode::OK, Json(PrintResponse { job_id, status: JobState::Cancelled, error: None })).into_response()
        }
        SubmissionResult::Expired { job_id } => {
            (StatusCode::OK, Json(PrintResponse { job_id, status: JobState::Expired, error: None })).into_response()
        }
        SubmissionResult::Timeout { job_id } => {
            let status = state.job_store.get(job_id).await.ok().flatten().map(|j| j.state).unwrap_or(JobState::Sent);
            (StatusCode::GATEWAY_TIMEOUT, Json(PrintResponse { job_id, status, error: None })).into_response()
        }
    }
}

/// `POST /api/pis/{id}/print` (spec §6). Branches on `Content-Type` since
/// axum routes a single handler per path+method — JSON and
/// `multipart/form-data` submissions share this entry point.
pub async fn print(State(state): State<Arc<AppState>>, Path(device_id): Path<String>, req: Request) -> Response {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let form = match Multipart::from_request(req, &state).await {
            Ok(form) => form,
            Err(rejection) => return DispatchError::InvalidRequest(rejection.to_string()).into_response(),
        };
        submit_print_multipart(state, device_id, form).await
    } else {
        let body = match Json::<PrintRequest>::from_request(req, &state).await {
            Ok(Json(body)) => body,
            Err(rejection) => return DispatchError::InvalidRequest(rejection.to_string()).into_response(),
        };
        submit_print_json(state, device_id, body).await
    }
}

async fn submit_print_json(
    state: Arc<AppState>,
    device_id: String,
    req: PrintRequest,
) -> Response {
    let payload = match payload_from_request(&req) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let priority = match priority_from(req.priority) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let result = state
        .dispatcher
        .submit(SubmitRequest {
            device_id,
            payload,
            priority,
            wait: req.wait_for_completion,
            fail_if_offline: req.fail_if_offline,
            source: JobSource::Api,
            idempotency_key: req.idempotency_key,
        })
        .await;

    match result {
        Ok(r) => submission_response(&state, r).await,
        Err(e) => e.into_response(),
    }
}

/// `multipart/form-data` variant of the print submission for the
/// `zpl_file` field (spec §6 "exactly one of `zpl_raw`, `zpl_url`, or
/// multipart `zpl_file`"). Non-file fields are read from form parts of the
/// same name as the JSON body.
async fn submit_print_multipart(state: Arc<AppState>, device_id: String, mut form: Multipart) -> Response {
    let mut zpl: Option<String> = None;
    let mut priority: Option<u8> = None;
    let mut wait_for_completion = true;
    let mut fail_if_offline = false;
    let mut idempotency_key: Option<String> = None;

    loop {
        let field = match form.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return DispatchError::InvalidRequest(e.to_string()).into_response(),
        };
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "zpl_file" => match field.text().await {
                Ok(text) => zpl = Some(text),
                Err(e) => return DispatchError::InvalidRequest(e.to_string()).into_response(),
            },
            "priority" => {
                if let Ok(text) = field.text().await {
                    priority = text.parse().ok();
                }
            }
            "wait_for_completion" => {
                if let Ok(text) = field.text().await {
                    wait_for_completion = text.parse().unwrap_or(true);
                }
            }
            "fail_if_offline" => {
                if let Ok(text) = field.text().await {
                    fail_if_offline = text.parse().unwrap_or(false);
                }
            }
            "idempotency_key" => {
                if let Ok(text) = field.text().await {
                    idempotency_key = Some(text);
                }
            }
            _ => {}
        }
    }

    let Some(zpl) = zpl else {
        return DispatchError::InvalidRequest("zpl_file field is required".into()).into_response();
    };
    let priority = match priority_from(priority) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let result = state
        .dispatcher
        .submit(SubmitRequest {
            device_id,
            payload: Payload::Inline { zpl },
            priority,
            wait: wait_for_completion,
            fail_if_offline,
            source: JobSource::Api,
            idempotency_key,
        })
        .await;

    match result {
        Ok(r) => submission_response(&state, r).await,
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RecentJobsQuery {
    pub limit: Option<u32>,
    pub pi_id: Option<String>,
    pub status: Option<JobState>,
}

pub async fn recent_jobs(State(state): State<Arc<AppState>>, Query(q): Query<RecentJobsQuery>) -> Response {
    let filter = JobFilter { device_id: q.pi_id, since: None, status: q.status, limit: q.limit.unwrap_or(100) };
    match state.dispatcher.list_jobs(filter).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> Response {
    match state.dispatcher.get_job(job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => DispatchError::JobNotFound(job_id).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job: Job,
}

/// `POST /api/jobs/{job_id}/cancel` (SPEC_FULL.md §4 admin cancel action,
/// keyed by job id rather than device id since cancellation targets one
/// specific Job).
pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> Response {
    match state.dispatcher.cancel(job_id).await {
        Ok(job) => Json(CancelResponse { job }).into_response(),
        Err(e) => e.into_response(),
    }
}
