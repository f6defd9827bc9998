// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Server configuration — `clap`-derived with env fallbacks, matching the
//! "Environment/config recognized on server" list in spec §6.

use std::time::Duration;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "labelberry-server", version, about = "LabelBerry central dispatch server")]
pub struct ServerConfig {
    /// Host to bind the HTTP API on.
    #[arg(long, default_value = "0.0.0.0", env = "LABELBERRY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "LABELBERRY_PORT")]
    pub port: u16,

    /// Database URL (SQLite; e.g. `sqlite://labelberry.db`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://labelberry.db")]
    pub database_url: String,

    /// NATS bus endpoint.
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "LABELBERRY_BUS_URL")]
    pub bus_url: String,

    /// NATS auth token, if the bus requires one.
    #[arg(long, env = "LABELBERRY_BUS_TOKEN")]
    pub bus_token: Option<String>,

    /// Retention window for inline ZPL payloads, in hours (spec §4.8, default 48h).
    #[arg(long, default_value_t = 48, env = "LABELBERRY_RETENTION_HOURS")]
    pub retention_hours: u64,

    /// Default Correlation Waiter deadline, in seconds (spec §4.5, default 60s).
    #[arg(long, default_value_t = 60, env = "LABELBERRY_WAITER_DEADLINE_SECS")]
    pub waiter_deadline_secs: u64,

    /// Bounded increment applied once when a job enters `processing` (spec §4.6, default 30s).
    #[arg(long, default_value_t = 30, env = "LABELBERRY_WAITER_EXTENSION_SECS")]
    pub waiter_extension_secs: u64,

    /// Max in-memory waiters (spec §6).
    #[arg(long, default_value_t = 10_000, env = "LABELBERRY_MAX_WAITERS")]
    pub max_waiters: usize,

    /// Per-device offline queue capacity (spec §4.7, "bounded large but finite").
    #[arg(long, default_value_t = 10_000, env = "LABELBERRY_OFFLINE_QUEUE_CAPACITY")]
    pub offline_queue_capacity: usize,

    /// Heartbeat cadence assumed for devices, in seconds; liveness is
    /// `3 * heartbeat_cadence` (spec §5).
    #[arg(long, default_value_t = 60, env = "LABELBERRY_HEARTBEAT_SECS")]
    pub heartbeat_secs: u64,

    /// Emit structured JSON logs instead of the human-readable format.
    #[arg(long, default_value_t = false, env = "LABELBERRY_LOG_JSON")]
    pub log_json: bool,

    /// Bearer token required on operator/registration endpoints (device
    /// register/update/delete). The UI's own user/session auth is an
    /// external collaborator (spec §1 Non-goals); this is the minimal
    /// shared-secret interface the core consumes in its place.
    #[arg(long, env = "LABELBERRY_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// How often the retention + 24h-expiry sweep runs, in seconds.
    #[arg(long, default_value_t = 300, env = "LABELBERRY_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: u64,

    /// How often the offline-queue bounded-expiry sweep runs, in seconds.
    #[arg(long, default_value_t = 300, env = "LABELBERRY_OFFLINE_SWEEP_INTERVAL_SECS")]
    pub offline_sweep_interval_secs: u64,
}

impl ServerConfig {
    pub fn waiter_deadline(&self) -> Duration {
        Duration::from_secs(self.waiter_deadline_secs)
    }

    pub fn waiter_extension(&self) -> Duration {
        Duration::from_secs(self.waiter_extension_secs)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs * 3)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn offline_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.offline_sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_parse() {
        let cfg = ServerConfig::parse_from(["labelberry-server"]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.waiter_deadline(), Duration::from_secs(60));
        assert_eq!(cfg.retention_window(), chrono::Duration::hours(48));
    }
}
