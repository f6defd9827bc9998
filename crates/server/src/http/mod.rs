// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! HTTP transport (spec §6 "HTTP — server"). Mirrors the teacher's
//! `transport::build_router`, but splits the route table into three
//! sub-routers merged together, since this service has two independent
//! auth schemes instead of one (spec §6 "Auth" column).

pub mod auth;
pub mod devices;
pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all LabelBerry server routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/pis", get(devices::list_devices))
        .route("/api/pis/{id}", get(devices::get_device));

    let operator = Router::new()
        .route("/api/pis", post(devices::register_device))
        .route("/api/pis/{id}", put(devices::update_device).delete(devices::delete_device))
        .layer(middleware::from_fn_with_state(state.clone(), auth::operator_auth_layer));

    let credentialed = Router::new()
        .route("/api/pis/{id}/print", post(jobs::print))
        .route("/api/recent-jobs", get(jobs::recent_jobs))
        .route("/api/jobs/{job_id}", get(jobs::get_job))
        .route("/api/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .layer(middleware::from_fn_with_state(state.clone(), auth::credential_auth_layer));

    public
        .merge(operator)
        .merge(credentialed)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
