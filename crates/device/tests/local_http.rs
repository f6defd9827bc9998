// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Exercises the device's local HTTP surface (`/print`, `/status`,
//! `/health`) against a real `DeviceQueue` backed by a temp-dir journal, no
//! bus connection required.

use std::sync::Arc;

use axum_test::TestServer;
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use labelberry_device::agent::http::build_router;
use labelberry_device::config::DeviceConfig;
use labelberry_device::queue::DeviceQueue;
use labelberry_device::state::DeviceState;

fn test_server() -> anyhow::Result<(TestServer, tempfile::TempDir)> {
    let dir = tempfile::tempdir()?;
    let queue = Arc::new(DeviceQueue::load(10, dir.path().join("queue.json"))?);
    let (tx, _rx) = mpsc::channel(8);
    let config = DeviceConfig::parse_from(["labelberry-device"]);
    let state = Arc::new(DeviceState::new(config, queue, tx, CancellationToken::new()));
    Ok((TestServer::new(build_router(state))?, dir))
}

#[tokio::test]
async fn health_is_ok() -> anyhow::Result<()> {
    let (server, _dir) = test_server()?;
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn print_then_status_reports_queue_depth() -> anyhow::Result<()> {
    let (server, _dir) = test_server()?;

    let print = server.post("/print").json(&json!({ "zpl_raw": "^XA^FO50,50^FDhi^FS^XZ" })).await;
    print.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: serde_json::Value = print.json();
    assert_eq!(body["queue_position"], 1);

    let status = server.get("/status").await;
    status.assert_status_ok();
    let body: serde_json::Value = status.json();
    assert_eq!(body["queue_depth"], 1);
    Ok(())
}

#[tokio::test]
async fn print_rejects_both_raw_and_url() -> anyhow::Result<()> {
    let (server, _dir) = test_server()?;
    let resp = server.post("/print").json(&json!({ "zpl_raw": "^XA^XZ", "zpl_url": "http://example/label" })).await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn test_print_enqueues_a_canned_label() -> anyhow::Result<()> {
    let (server, _dir) = test_server()?;
    let resp = server.post("/test-print").await;
    resp.assert_status(axum::http::StatusCode::ACCEPTED);

    let status = server.get("/status").await;
    let body: serde_json::Value = status.json();
    assert_eq!(body["queue_depth"], 1);
    Ok(())
}
