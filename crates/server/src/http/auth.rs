// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Two independent auth schemes, applied to disjoint route groups (spec §6
//! "Auth" column): an operator shared-secret for device registration/admin
//! routes, and per-caller bearer tokens (§3 "API Credential") for print
//! submission and job history.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::DispatchError;
use crate::state::AppState;

/// Constant-time comparison — avoids a timing side channel on the shared
/// operator secret.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Guards device registration/update/delete (spec §6 "session" auth column;
/// UI session auth itself is out of scope — see spec §1 Non-goals — this is
/// the minimal shared-secret interface the core consumes in its place).
pub async fn operator_auth_layer(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(expected) = state.config.admin_token.as_deref() else {
        // No operator token configured: treat registration as open, same as
        // the teacher's auth_layer when `auth_token` is unset.
        return next.run(req).await;
    };

    match bearer_token(req.headers()) {
        Some(token) if constant_time_eq(token, expected) => next.run(req).await,
        _ => DispatchError::Unauthorized.into_response(),
    }
}

/// Guards print submission and job history (spec §6 "bearer" auth column)
/// against the durable `api_credentials` table.
pub async fn credential_auth_layer(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return DispatchError::Unauthorized.into_response();
    };

    match state.credential_store.authenticate(token).await {
        Ok(true) => next.run(req).await,
        Ok(false) => DispatchError::Unauthorized.into_response(),
        Err(e) => DispatchError::Store(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_and_rejects() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer lbk_xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("lbk_xyz"));
    }
}
