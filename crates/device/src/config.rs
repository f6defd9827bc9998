// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Device configuration — `clap`-derived CLI/env flags layered over a YAML
//! file (spec §6 "a YAML config under `/etc/labelberry/client.conf`").
//! The file supplies the defaults operators actually edit; CLI flags and
//! env vars override it, matching the server's `ServerConfig` precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "labelberry-device", version, about = "LabelBerry device agent")]
pub struct DeviceConfig {
    /// Path to the YAML config file layered under these flags.
    #[arg(long, default_value = "/etc/labelberry/client.conf", env = "LABELBERRY_CONF")]
    pub config_file: PathBuf,

    /// This device's id, as registered with the server.
    #[arg(long, env = "LABELBERRY_DEVICE_ID")]
    pub device_id: Option<String>,

    /// Shared secret used to authenticate on the bus.
    #[arg(long, env = "LABELBERRY_DEVICE_SECRET")]
    pub device_secret: Option<String>,

    /// NATS bus endpoint.
    #[arg(long, env = "LABELBERRY_BUS_URL")]
    pub bus_url: Option<String>,

    /// Base URL of the central server, used to fetch `zpl_url` payloads.
    #[arg(long, env = "LABELBERRY_SERVER_URL")]
    pub server_url: Option<String>,

    /// Configured printer character-device path, tried before the
    /// well-known fallback list (spec §4.1).
    #[arg(long, env = "LABELBERRY_PRINTER_PATH")]
    pub printer_path: Option<String>,

    /// Declared label size, published in capabilities.
    #[arg(long, env = "LABELBERRY_LABEL_SIZE")]
    pub label_size: Option<String>,

    /// Declared printer model, published in capabilities.
    #[arg(long, env = "LABELBERRY_PRINTER_MODEL")]
    pub printer_model: Option<String>,

    /// Declared firmware build, published in capabilities.
    #[arg(long, env = "LABELBERRY_FIRMWARE_BUILD")]
    pub firmware_build: Option<String>,

    /// Local Queue capacity (spec §4.2, default 100).
    #[arg(long, env = "LABELBERRY_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Path to the durable queue journal (spec §6).
    #[arg(long, env = "LABELBERRY_QUEUE_JOURNAL")]
    pub queue_journal: Option<PathBuf>,

    /// Host to bind the local HTTP surface on.
    #[arg(long, default_value = "0.0.0.0", env = "LABELBERRY_LOCAL_HOST")]
    pub local_host: String,

    /// Port for the local HTTP surface (spec §4.3/§6).
    #[arg(long, default_value_t = 9090, env = "LABELBERRY_LOCAL_PORT")]
    pub local_port: u16,

    /// Heartbeat cadence, in seconds (spec §4.3, default 60s).
    #[arg(long, default_value_t = 60, env = "LABELBERRY_HEARTBEAT_SECS")]
    pub heartbeat_secs: u64,

    /// Emit structured JSON logs instead of the human-readable format.
    #[arg(long, default_value_t = false, env = "LABELBERRY_LOG_JSON")]
    pub log_json: bool,
}

/// Subset of `DeviceConfig` that may be supplied via the YAML file on disk.
/// Every field is optional since CLI/env flags can supply the same value.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    device_id: Option<String>,
    device_secret: Option<String>,
    bus_url: Option<String>,
    server_url: Option<String>,
    printer_path: Option<String>,
    label_size: Option<String>,
    printer_model: Option<String>,
    firmware_build: Option<String>,
    queue_capacity: Option<usize>,
    queue_journal: Option<PathBuf>,
}

impl DeviceConfig {
    /// Layer the YAML file at `config_file` under the CLI/env-supplied
    /// values. A missing file is not an error: some deployments configure
    /// everything through flags/env alone.
    pub fn load_file(&mut self) -> anyhow::Result<()> {
        let file = match Self::read_file(&self.config_file) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.device_id = self.device_id.take().or(file.device_id);
        self.device_secret = self.device_secret.take().or(file.device_secret);
        self.bus_url = self.bus_url.take().or(file.bus_url);
        self.server_url = self.server_url.take().or(file.server_url);
        self.printer_path = self.printer_path.take().or(file.printer_path);
        self.label_size = self.label_size.take().or(file.label_size);
        self.printer_model = self.printer_model.take().or(file.printer_model);
        self.firmware_build = self.firmware_build.take().or(file.firmware_build);
        self.queue_capacity = self.queue_capacity.or(file.queue_capacity);
        self.queue_journal = self.queue_journal.take().or(file.queue_journal);
        Ok(())
    }

    fn read_file(path: &Path) -> std::io::Result<FileConfig> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(std::io::Error::other)
    }

    pub fn device_id(&self) -> anyhow::Result<&str> {
        self.device_id.as_deref().ok_or_else(|| anyhow::anyhow!("device_id is required"))
    }

    pub fn device_secret(&self) -> anyhow::Result<&str> {
        self.device_secret.as_deref().ok_or_else(|| anyhow::anyhow!("device_secret is required"))
    }

    pub fn bus_url(&self) -> &str {
        self.bus_url.as_deref().unwrap_or("nats://127.0.0.1:4222")
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(100)
    }

    pub fn queue_journal(&self) -> PathBuf {
        self.queue_journal.clone().unwrap_or_else(|| PathBuf::from("/var/lib/labelberry/queue.json"))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn capabilities(&self) -> labelberry_common::Capabilities {
        labelberry_common::Capabilities {
            printer_model: self.printer_model.clone().unwrap_or_else(|| "unknown".into()),
            label_size: self.label_size.clone().unwrap_or_else(|| "4x6".into()),
            firmware_build: self.firmware_build.clone().unwrap_or_else(|| "unknown".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_parse() -> anyhow::Result<()> {
        let cfg = DeviceConfig::parse_from(["labelberry-device"]);
        assert_eq!(cfg.local_port, 9090);
        assert_eq!(cfg.queue_capacity(), 100);
        assert_eq!(cfg.bus_url(), "nats://127.0.0.1:4222");
        Ok(())
    }

    #[test]
    fn file_config_fills_unset_fields() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "device_id: D1\ndevice_secret: s3cr3t\nlabel_size: 4x6\n")?;

        let mut cfg = DeviceConfig::parse_from(["labelberry-device"]);
        cfg.config_file = file.path().to_path_buf();
        cfg.load_file()?;

        assert_eq!(cfg.device_id()?, "D1");
        assert_eq!(cfg.device_secret()?, "s3cr3t");
        Ok(())
    }

    #[test]
    fn cli_value_wins_over_file_value() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "device_id: from-file\n")?;

        let mut cfg = DeviceConfig::parse_from(["labelberry-device", "--device-id", "from-cli"]);
        cfg.config_file = file.path().to_path_buf();
        cfg.load_file()?;

        assert_eq!(cfg.device_id()?, "from-cli");
        Ok(())
    }

    #[test]
    fn missing_file_is_not_an_error() -> anyhow::Result<()> {
        let mut cfg = DeviceConfig::parse_from(["labelberry-device"]);
        cfg.config_file = PathBuf::from("/nonexistent/labelberry/client.conf");
        cfg.load_file()?;
        Ok(())
    }
}
