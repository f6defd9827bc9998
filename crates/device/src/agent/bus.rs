// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device-side bus client: connect, authenticate with the device secret,
//! publish `hello`/`status`/`events`, subscribe to `commands`/`config`
//! (spec §4.3). Mirrors the server's `bus::client::NatsBus` shape.

use labelberry_common::{topic, CommandEnvelope, HelloEnvelope, LifecycleEvent, StatusEnvelope};

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
}

#[derive(Clone)]
pub struct DeviceBus {
    client: async_nats::Client,
    device_id: String,
}

impl DeviceBus {
    /// Connect and authenticate with the device secret as the bus token
    /// (spec §4.3 "Authenticate with the device secret"). NATS core has no
    /// native last-will; going offline ungracefully is instead detected by
    /// the server's `BusSessionRegistry` staleness window, and a graceful
    /// shutdown publishes an explicit `{connected: false}` status (see
    /// [`crate::agent::run`]).
    pub async fn connect(url: &str, device_id: &str, secret: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .token(secret.to_owned())
            .connect(url)
            .await?;
        Ok(Self { client, device_id: device_id.to_owned() })
    }

    pub async fn publish_hello(&self, hello: &HelloEnvelope) -> Result<(), BusError> {
        let payload = serde_json::to_vec(hello)?;
        self.client.publish(topic::hello(&self.device_id), payload.into()).await?;
        Ok(())
    }

    pub async fn publish_status(&self, status: &StatusEnvelope) -> Result<(), BusError> {
        let payload = serde_json::to_vec(status)?;
        self.client.publish(topic::status(&self.device_id), payload.into()).await?;
        Ok(())
    }

    pub async fn publish_event(&self, event: &LifecycleEvent) -> Result<(), BusError> {
        let payload = serde_json::to_vec(event)?;
        self.client.publish(topic::events(&self.device_id), payload.into()).await?;
        Ok(())
    }

    pub async fn subscribe_commands(&self) -> Result<async_nats::Subscriber, BusError> {
        Ok(self.client.subscribe(topic::commands(&self.device_id)).await?)
    }

    pub async fn subscribe_config(&self) -> Result<async_nats::Subscriber, BusError> {
        Ok(self.client.subscribe(topic::config(&self.device_id)).await?)
    }
}

/// Parse a received `commands` subject payload.
pub fn parse_command(payload: &[u8]) -> Result<CommandEnvelope, serde_json::Error> {
    serde_json::from_slice(payload)
}
