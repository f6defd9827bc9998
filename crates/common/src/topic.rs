// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Bus topic scheme (spec §6).
//!
//! For a device with id `D`:
//! - `server→device`: `labelberry/pi/D/commands`
//! - `device→server`: `labelberry/pi/D/status`, `/events`, `/hello`

pub fn commands(device_id: &str) -> String {
    format!("labelberry.pi.{device_id}.commands")
}

pub fn status(device_id: &str) -> String {
    format!("labelberry.pi.{device_id}.status")
}

pub fn events(device_id: &str) -> String {
    format!("labelberry.pi.{device_id}.events")
}

pub fn hello(device_id: &str) -> String {
    format!("labelberry.pi.{device_id}.hello")
}

/// Operator-pushed config updates, subscribed alongside `commands` (spec
/// §4.3 "Subscribe to commands and config topics scoped to the device id").
pub fn config(device_id: &str) -> String {
    format!("labelberry.pi.{device_id}.config")
}

/// Wildcard subject matching every per-device subtopic, used by the server
/// to subscribe once for all devices (spec §4.6 "subscribes to the
/// device→server lifecycle topic for all devices").
pub const STATUS_WILDCARD: &str = "labelberry.pi.*.status";
pub const EVENTS_WILDCARD: &str = "labelberry.pi.*.events";
pub const HELLO_WILDCARD: &str = "labelberry.pi.*.hello";

/// Extract the device id from a concrete (non-wildcard) subject produced by
/// one of the functions above. Returns `None` if the subject doesn't match
/// the `labelberry.pi.<id>.<suffix>` shape.
pub fn device_id_from_subject<'a>(subject: &'a str, suffix: &str) -> Option<&'a str> {
    let rest = subject.strip_prefix("labelberry.pi.")?;
    let rest = rest.strip_suffix(&format!(".{suffix}"))?;
    (!rest.is_empty() && !rest.contains('.')).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_shape() {
        assert_eq!(commands("D1"), "labelberry.pi.D1.commands");
        assert_eq!(events("D1"), "labelberry.pi.D1.events");
    }

    #[test]
    fn extracts_device_id() {
        assert_eq!(device_id_from_subject("labelberry.pi.D1.status", "status"), Some("D1"));
        assert_eq!(device_id_from_subject("labelberry.pi.D1.events", "status"), None);
        assert_eq!(device_id_from_subject("garbage", "status"), None);
    }
}
