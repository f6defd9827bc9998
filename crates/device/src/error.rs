// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device-local error types, mapped down to the stable wire taxonomy in
//! `labelberry_common::ErrorKind` (spec §7) at the Queue/Agent boundary.

use labelberry_common::ErrorKind;

/// Outcome of a single `PrinterDriver::send` call (spec §4.1 contract).
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Ok,
    NotPresent,
    Busy,
    IoError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("no printer present at any candidate path")]
    NotPresent,
    #[error("printer busy")]
    Busy,
    #[error("printer I/O error: {0}")]
    Io(String),
}

impl PrinterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotPresent => ErrorKind::PrinterNotPresent,
            Self::Busy => ErrorKind::PrinterBusy,
            Self::Io(_) => ErrorKind::PrinterIoError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("job not found")]
    NotFound,
    #[error("journal I/O error: {0}")]
    Journal(#[from] std::io::Error),
    #[error("journal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Full => ErrorKind::QueueFull,
            Self::NotFound => ErrorKind::NotFound,
            Self::Journal(_) | Self::Serde(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("bus error: {0}")]
    Bus(#[from] async_nats::ConnectError),
    #[error("bus publish error: {0}")]
    Publish(#[from] async_nats::PublishError),
    #[error("bus subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("zpl fetch failed: {0}")]
    ZplFetch(String),
}
