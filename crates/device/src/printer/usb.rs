// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! USB fallback print path: match vendor id + printer-class interface,
//! claim it, write the payload over the bulk-out endpoint (spec §4.1
//! "attempt fallback: open the USB interface directly by matching vendor
//! id and interface class `printer`").

use nusb::transfer::{Direction, EndpointType};

use crate::error::SendOutcome;

/// Zebra Technologies USB vendor id.
const ZEBRA_VENDOR_ID: u16 = 0x0A5F;

/// USB Printer device class (`bInterfaceClass`).
const USB_CLASS_PRINTER: u8 = 7;

/// Find the first Zebra printer-class interface, claim it (detaching the
/// kernel driver if one holds it), write `data` over the bulk-out
/// endpoint, and release. One-shot: a fresh interface is opened and
/// dropped per call, matching the Printer Driver's "single in-flight
/// write" contract (spec §4.1).
pub async fn send(data: &[u8]) -> SendOutcome {
    let devices = match nusb::list_devices() {
        Ok(d) => d,
        Err(e) => return SendOutcome::IoError(format!("usb enumerate failed: {e}")),
    };

    let Some(dev_info) = devices.filter(|d| d.vendor_id() == ZEBRA_VENDOR_ID).find(|d| {
        d.interfaces().any(|iface| iface.class() == USB_CLASS_PRINTER)
    }) else {
        return SendOutcome::NotPresent;
    };

    let interface_number = dev_info
        .interfaces()
        .find(|iface| iface.class() == USB_CLASS_PRINTER)
        .map(|iface| iface.interface_number());
    let Some(interface_number) = interface_number else {
        return SendOutcome::NotPresent;
    };

    let device = match dev_info.open() {
        Ok(d) => d,
        Err(e) => return SendOutcome::IoError(format!("usb open failed: {e}")),
    };

    let ep_out = match discover_bulk_out(&device, interface_number) {
        Ok(ep) => ep,
        Err(outcome) => return outcome,
    };

    // The kernel's usblp driver may already hold this interface; detach it
    // for the duration of the write and reattach on drop (spec §4.1).
    let interface = match device.detach_and_claim_interface(interface_number) {
        Ok(i) => i,
        Err(e) if is_busy(&e) => return SendOutcome::Busy,
        Err(e) => return SendOutcome::IoError(format!("usb claim failed: {e}")),
    };

    let completion = interface.bulk_out(ep_out, data.to_vec()).await;
    match completion.status {
        Ok(()) => SendOutcome::Ok,
        Err(e) => SendOutcome::IoError(format!("usb bulk out: {e}")),
    }
}

fn discover_bulk_out(device: &nusb::Device, interface_number: u8) -> Result<u8, SendOutcome> {
    let config = device
        .active_configuration()
        .map_err(|e| SendOutcome::IoError(format!("usb read config failed: {e}")))?;

    for alt_setting in config.interface_alt_settings() {
        if alt_setting.interface_number() != interface_number || alt_setting.alternate_setting() != 0 {
            continue;
        }
        for ep in alt_setting.endpoints() {
            if ep.transfer_type() == EndpointType::Bulk && ep.direction() == Direction::Out {
                return Ok(ep.address());
            }
        }
    }

    Err(SendOutcome::IoError("no bulk OUT endpoint on printer interface".into()))
}

fn is_busy(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::PermissionDenied
}
