// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Thin wrapper around the NATS client: connect once, publish per-device
//! commands. Publishing is serialized per device by the caller (the
//! Dispatcher), satisfying spec §5's "commands published by the Dispatcher
//! are delivered in publish order (single publishing task per device)".

use labelberry_common::{topic, CommandEnvelope};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(#[from] async_nats::ConnectError),
    #[error("bus publish failed: {0}")]
    Publish(#[from] async_nats::PublishError),
    #[error("bus subscribe failed: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("bus client not connected")]
    NotConnected,
}

/// `None` only in tests that never exercise the online-publish path
/// (constructing a live `async_nats::Client` requires a reachable broker).
#[derive(Clone)]
pub struct NatsBus {
    client: Option<async_nats::Client>,
}

impl NatsBus {
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, BusError> {
        let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        if let Some(token) = token {
            opts = opts.token(token.to_owned());
        }
        let client = opts.connect(url).await?;
        Ok(Self { client: Some(client) })
    }

    /// Used by unit tests and the crate's own `tests/` integration suite, both
    /// of which need a `NatsBus` without a reachable broker.
    pub fn disconnected_for_test() -> Self {
        Self { client: None }
    }

    pub async fn publish_command(&self, device_id: &str, envelope: &CommandEnvelope) -> Result<(), BusError> {
        let client = self.client.as_ref().ok_or(BusError::NotConnected)?;
        let payload = serde_json::to_vec(envelope)?;
        client.publish(topic::commands(device_id), payload.into()).await?;
        Ok(())
    }

    /// Subscribe to a subject (used by the lifecycle-event subscriber, which
    /// only ever runs against a live bus — see `subscriber::run`).
    pub async fn subscribe(&self, subject: &'static str) -> Result<async_nats::Subscriber, BusError> {
        let client = self.client.as_ref().ok_or(BusError::NotConnected)?;
        Ok(client.subscribe(subject).await?)
    }
}
