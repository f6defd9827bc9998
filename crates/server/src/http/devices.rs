// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device registration/list/detail/update/delete (spec §6, first five rows).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::state::AppState;
use crate::store::device_store::{RegisterDevice, UpdateDevice};

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    /// Stable device id; generated if omitted (spec §3 "opaque id, unique").
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub printer_path: String,
    pub label_size: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub id: String,
    /// Returned exactly once (spec §3 "secret is never returned after creation").
    pub secret: String,
    pub name: String,
    pub printer_path: String,
    pub label_size: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    pub printer_path: String,
    pub label_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_build: Option<String>,
    pub connected: bool,
    pub last_heartbeat_secs_ago: Option<u64>,
    pub in_flight_jobs: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub printer_path: Option<String>,
    pub label_size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteDeviceResponse {
    pub id: String,
    pub deleted: bool,
}

pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.printer_path.trim().is_empty() || req.label_size.trim().is_empty() {
        return DispatchError::InvalidRequest("name, printer_path, and label_size are required".into())
            .into_response();
    }
    let id = req.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match state
        .device_store
        .register(RegisterDevice { id, name: req.name, printer_path: req.printer_path, label_size: req.label_size })
        .await
    {
        Ok((device, secret)) => Json(RegisterDeviceResponse {
            id: device.id,
            secret: secret.0,
            name: device.name,
            printer_path: device.printer_path,
            label_size: device.label_size,
        })
        .into_response(),
        Err(e) => DispatchError::Store(e).into_response(),
    }
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Response {
    let devices = match state.device_store.list().await {
        Ok(devices) => devices,
        Err(e) => return DispatchError::Store(e).into_response(),
    };
    let sessions = state.registry.snapshot().await;

    let views: Vec<DeviceView> = devices
        .into_iter()
        .map(|d| {
            let session = sessions.iter().find(|s| s.device_id == d.id);
            DeviceView {
                id: d.id,
                name: d.name,
                printer_path: d.printer_path,
                label_size: d.label_size,
                printer_model: d.printer_model,
                firmware_build: d.firmware_build,
                connected: session.map(|s| s.connected).unwrap_or(false),
                last_heartbeat_secs_ago: session.map(|s| s.last_heartbeat_secs_ago),
                in_flight_jobs: session.map(|s| s.in_flight_jobs).unwrap_or(0),
            }
        })
        .collect();
    Json(views).into_response()
}

pub async fn get_device(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let device = match state.device_store.get(&id).await {
        Ok(Some(d)) => d,
        Ok(None) => return DispatchError::DeviceNotFound(id).into_response(),
        Err(e) => return DispatchError::Store(e).into_response(),
    };
    let connected = state.registry.is_connected(&id).await;
    let session = state.registry.snapshot().await.into_iter().find(|s| s.device_id == id);

    Json(DeviceView {
        id: device.id,
        name: device.name,
        printer_path: device.printer_path,
        label_size: device.label_size,
        printer_model: device.printer_model,
        firmware_build: device.firmware_build,
        connected,
        last_heartbeat_secs_ago: session.as_ref().map(|s| s.last_heartbeat_secs_ago),
        in_flight_jobs: session.map(|s| s.in_flight_jobs).unwrap_or(0),
    })
    .into_response()
}

pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Response {
    let update = UpdateDevice { name: req.name, printer_path: req.printer_path, label_size: req.label_size };
    match state.device_store.update(&id, update).await {
        Ok(Some(device)) => Json(DeviceView {
            id: device.id,
            name: device.name,
            printer_path: device.printer_path,
            label_size: device.label_size,
            printer_model: device.printer_model,
            firmware_build: device.firmware_build,
            connected: state.registry.is_connected(&id).await,
            last_heartbeat_secs_ago: None,
            in_flight_jobs: 0,
        })
        .into_response(),
        Ok(None) => DispatchError::DeviceNotFound(id).into_response(),
        Err(e) => DispatchError::Store(e).into_response(),
    }
}

/// Deletion revokes the secret (by removing the row entirely — no future
/// `verify_secret` call can match) and evicts any Bus Session (spec §3).
pub async fn delete_device(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.device_store.delete(&id).await {
        Ok(true) => {
            state.registry.mark_disconnected(&id).await;
            if let Err(e) = state.offline_store.remove_all_for_device(&id).await {
                tracing::warn!(device_id = %id, error = %e, "failed to drop offline queue for deleted device");
            }
            Json(DeleteDeviceResponse { id, deleted: true }).into_response()
        }
        Ok(false) => DispatchError::DeviceNotFound(id).into_response(),
        Err(e) => DispatchError::Store(e).into_response(),
    }
}
