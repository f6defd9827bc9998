// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Primary print path: write the ZPL payload to a character device and
//! fsync (spec §4.1 "open the configured character device exclusively,
//! write the entire ZPL payload, fsync, close").

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::SendOutcome;

/// Well-known fallback device names probed in order when the configured
/// path is absent (spec §4.1 "probing alternative well-known device names
/// in a fixed order").
pub const FALLBACK_PATHS: &[&str] = &["/dev/usb/lp0", "/dev/usb/lp1", "/dev/ttyUSB0"];

/// Attempt to write `data` to `path`, opened for exclusive access.
/// Returns `NotPresent` only when the device file doesn't exist (`ENOENT`);
/// any other OS error is surfaced as `IoError` since it isn't the
/// "transient wiring" case the retry policy special-cases (spec §4.1).
pub fn write_to(path: &Path, data: &[u8]) -> SendOutcome {
    let file = OpenOptions::new().write(true).open(path);
    let mut file = match file {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SendOutcome::NotPresent,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return SendOutcome::Busy,
        Err(e) => return SendOutcome::IoError(e.to_string()),
    };

    if let Err(e) = file.write_all(data) {
        return SendOutcome::IoError(e.to_string());
    }
    if let Err(e) = file.sync_all() {
        return SendOutcome::IoError(e.to_string());
    }
    SendOutcome::Ok
}

/// Probe the configured path first, then [`FALLBACK_PATHS`] in order,
/// returning the first path whose write attempt doesn't report
/// `NotPresent` (spec §4.1).
pub fn probe_paths(configured: Option<&str>) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(p) = configured {
        paths.push(p.to_owned());
    }
    for fallback in FALLBACK_PATHS {
        if configured != Some(*fallback) {
            paths.push((*fallback).to_owned());
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_reports_not_present() -> anyhow::Result<()> {
        let outcome = write_to(Path::new("/nonexistent/labelberry/lp0"), b"^XA^XZ");
        assert!(matches!(outcome, SendOutcome::NotPresent));
        Ok(())
    }

    #[test]
    fn successful_write_via_regular_file() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let outcome = write_to(file.path(), b"^XA^FO50,50^FDhi^FS^XZ");
        assert!(matches!(outcome, SendOutcome::Ok));
        assert_eq!(std::fs::read(file.path())?, b"^XA^FO50,50^FDhi^FS^XZ");
        Ok(())
    }

    #[test]
    fn probe_order_puts_configured_path_first() {
        let paths = probe_paths(Some("/dev/custom/printer"));
        assert_eq!(paths[0], "/dev/custom/printer");
        assert_eq!(&paths[1..], FALLBACK_PATHS);
    }

    #[test]
    fn probe_order_dedupes_configured_fallback() {
        let paths = probe_paths(Some("/dev/usb/lp0"));
        assert_eq!(paths, vec!["/dev/usb/lp0", "/dev/usb/lp1", "/dev/ttyUSB0"]);
    }
}
