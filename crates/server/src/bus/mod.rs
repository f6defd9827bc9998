// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

pub mod client;
pub mod registry;
pub mod subscriber;

pub use client::{BusError, NatsBus};
pub use registry::{BusSessionRegistry, Displaced, SessionInfo};
