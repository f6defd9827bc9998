// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! LabelBerry device agent: the SBC-resident process that owns one Zebra
//! printer, its local durable Queue, and the bus session to the central
//! server (spec §1, §4.1-§4.3). Nothing outside `agent::run` talks to the
//! bus or the printer directly.

pub mod agent;
pub mod config;
pub mod error;
pub mod printer;
pub mod queue;
pub mod state;
