//! Device discovery: native interface lists in, canonical [`DeviceRecord`]s out.
//!
//! Resolution of optional fields is best-effort. A failed friendly-name,
//! port-name, usage or filesystem lookup leaves the field empty; only a
//! missing path, or a HID interface without any vendor/product id, drops a
//! record.

use crate::device::{DeviceKind, DeviceRecord};
use crate::identity;
use crate::native::{
    DeviceProperty, HidAttributes, HidUsage, NativeDeviceApi, NativeError, OpenMode,
    RawInterface,
};

/// Enumerate one kind, or every kind (HID, then Serial, then USB) for `None`.
///
/// Each call is an independent snapshot; nothing is cached between calls.
pub fn enumerate_devices<A: NativeDeviceApi>(
    api: &A,
    kind: Option<DeviceKind>,
) -> Vec<DeviceRecord> {
    match kind {
        Some(kind) => enumerate_kind(api, kind),
        None => DeviceKind::ALL
            .into_iter()
            .flat_map(|kind| enumerate_kind(api, kind))
            .collect(),
    }
}

/// Enumerate the present interfaces of one kind, in platform order.
pub fn enumerate_kind<A: NativeDeviceApi>(api: &A, kind: DeviceKind) -> Vec<DeviceRecord> {
    let interfaces = match api.enumerate_interfaces(kind) {
        Ok(interfaces) => interfaces,
        Err(NativeError::NoMoreItems) => return Vec::new(),
        Err(e) => {
            log::warn!("{kind} enumeration failed: {e}");
            return Vec::new();
        }
    };
    log::debug!("{kind}: {} interface(s)", interfaces.len());
    interfaces
        .iter()
        .filter_map(|iface| resolve(api, kind, iface))
        .collect()
}

fn resolve<A: NativeDeviceApi>(
    api: &A,
    kind: DeviceKind,
    iface: &RawInterface,
) -> Option<DeviceRecord> {
    if iface.raw_path.is_empty() {
        log::trace!("{kind}: skipping interface without a path");
        return None;
    }
    let device_path = identity::normalize_path(&iface.raw_path);
    log::trace!("{kind}: resolving {device_path}");

    let property = |which: DeviceProperty| -> Option<String> {
        let instance = iface.instance?;
        api.string_property(instance, which)
            .map(|s| s.trim_end_matches('\0').to_string())
            .filter(|s| !s.is_empty())
    };

    let hardware_ids = property(DeviceProperty::HardwareIds);
    let mut ids = hardware_ids
        .as_deref()
        .and_then(identity::vid_pid_from_hardware_ids);
    let mut version = hardware_ids
        .as_deref()
        .and_then(identity::revision_from_hardware_ids)
        .unwrap_or(0);
    let is_hid = kind == DeviceKind::Hid;
    let query = if is_hid || ids.is_none() {
        query_device(api, &device_path, ids.is_none(), is_hid)
    } else {
        DeviceQuery::default()
    };
    if let Some(attrs) = query.attributes {
        ids = Some((attrs.vendor_id, attrs.product_id));
        version = attrs.version;
    }
    let usage = query.usage.unwrap_or_default();

    let (vendor_id, product_id) = ids.unwrap_or((0, 0));
    if kind == DeviceKind::Hid && vendor_id == 0 && product_id == 0 {
        log::debug!("HID: skipping {device_path}: no vendor/product id");
        return None;
    }

    let friendly_name = property(DeviceProperty::FriendlyName).unwrap_or_default();
    let instance_id = property(DeviceProperty::InstanceId).unwrap_or_default();
    let port_name = match kind {
        DeviceKind::Serial => resolve_port_name(
            property(DeviceProperty::PortName).as_deref(),
            &friendly_name,
            &device_path,
        ),
        _ => String::new(),
    };
    let filesystem_name = identity::volume_root(&device_path)
        .and_then(|root| api.filesystem_name(root.as_str()))
        .unwrap_or_default();

    Some(DeviceRecord {
        kind,
        device_path,
        vendor_id,
        product_id,
        version,
        usage_page: usage.usage_page,
        usage: usage.usage,
        instance_id,
        friendly_name,
        port_name,
        filesystem_name,
    })
}

#[derive(Default)]
struct DeviceQuery {
    attributes: Option<HidAttributes>,
    usage: Option<HidUsage>,
}

/// Open the device briefly and ask the class driver for its identity
/// and/or its top-level collection usage.
fn query_device<A: NativeDeviceApi>(
    api: &A,
    path: &str,
    attributes: bool,
    usage: bool,
) -> DeviceQuery {
    let handle = match api.open(path, OpenMode::Query) {
        Ok(handle) => handle,
        Err(e) => {
            log::trace!("device query: open {path}: {e}");
            return DeviceQuery::default();
        }
    };
    let query = DeviceQuery {
        attributes: attributes
            .then(|| api.hid_attributes(handle))
            .and_then(|r| r.inspect_err(|e| log::trace!("attribute query: {path}: {e}")).ok()),
        usage: usage
            .then(|| api.hid_usage(handle))
            .and_then(|r| r.inspect_err(|e| log::trace!("usage query: {path}: {e}")).ok()),
    };
    api.close_handle(handle);
    query
}

/// Port label fallback chain: canonical registry `PortName`, then a `COM<n>`
/// inside the friendly name, then inside the path, then the path itself.
pub fn resolve_port_name(registry: Option<&str>, friendly_name: &str, device_path: &str) -> String {
    if let Some(value) = registry {
        match identity::canonical_port_name(value) {
            Some(name) => return name,
            None => log::warn!("{device_path}: ignoring non-canonical PortName {value:?}"),
        }
    }
    identity::extract_port_label(friendly_name)
        .or_else(|| identity::extract_port_label(device_path))
        .unwrap_or_else(|| device_path.to_string())
}
