//! Integration tests: device discovery through the public API using MockApi.

use devport_lib::native::mock::{MockApi, MockDevice};
use devport_lib::native::{DeviceProperty, HidUsage, NativeError, ReportLengths};
use devport_lib::{DeviceKind, enumerate_devices};

const MOUSE_RAW: &str = r"\\?\hid#vid_046d&pid_c52b&mi_00#7&2a8b&0&0000#{4d1e55b2-f16f-11cf-88cb-001111000030}";

fn single_hid() -> MockApi {
    let api = MockApi::new();
    api.add_interface(DeviceKind::Hid, MOUSE_RAW, Some(1));
    api.set_property(1, DeviceProperty::HardwareIds, "HID\\VID_046D&PID_C52B");
    api
}

#[test]
fn single_hid_interface_yields_one_record() {
    let api = single_hid();
    let records = enumerate_devices(&api, Some(DeviceKind::Hid));
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.vendor_id, 0x046D);
    assert_eq!(r.product_id, 0xC52B);
    assert_eq!(r.to_string(), "HID 046D:C52B");
    assert!(r.device_path.starts_with(r"\\?\"));
}

#[test]
fn composite_hardware_ids_use_first_matching_entry() {
    let api = MockApi::new();
    api.add_interface(DeviceKind::Hid, MOUSE_RAW, Some(1));
    api.set_property(
        1,
        DeviceProperty::HardwareIds,
        "HID\\VID_046D&PID_C52B&REV_1211&MI_00\0HID\\VID_046D&PID_C52B&MI_00\0HID_DEVICE\0\0",
    );
    let r = &enumerate_devices(&api, Some(DeviceKind::Hid))[0];
    assert_eq!((r.vendor_id, r.product_id, r.version), (0x046D, 0xC52B, 0x1211));
}

#[test]
fn serial_port_name_from_registry_without_com_in_friendly_name() {
    let api = MockApi::new();
    api.add_interface(
        DeviceKind::Serial,
        r"\\?\acpi#pnp0501#1#{86e0d1e0-8089-11d0-9ce4-08003e301f73}",
        Some(4),
    );
    api.set_property(4, DeviceProperty::FriendlyName, "Communications Port");
    api.set_property(4, DeviceProperty::PortName, "COM3");
    let records = enumerate_devices(&api, Some(DeviceKind::Serial));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].port_name, "COM3");
    assert_eq!(records[0].label(), "Communications Port");
}

#[test]
fn serial_port_name_falls_back_to_friendly_name() {
    let api = MockApi::new();
    api.add_interface(DeviceKind::Serial, r"\\?\ftdibus#vid_0403+pid_6001#1", Some(2));
    api.set_property(2, DeviceProperty::FriendlyName, "USB Serial Port (COM12)");
    let r = &enumerate_devices(&api, Some(DeviceKind::Serial))[0];
    assert_eq!(r.port_name, "COM12");
    assert_eq!((r.vendor_id, r.product_id), (0, 0));
}

#[test]
fn hid_attribute_fallback_when_no_hardware_ids() {
    let api = MockApi::new();
    api.add_interface(DeviceKind::Hid, MOUSE_RAW, None);
    api.add_device(MOUSE_RAW, MockDevice::hid(0x16C0, 0x05DF, ReportLengths::default()));
    let records = enumerate_devices(&api, Some(DeviceKind::Hid));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].vendor_id, 0x16C0);
    assert_eq!(api.open_handle_count(), 0, "query handle must be closed");
}

#[test]
fn unidentifiable_hid_is_dropped_but_usb_is_kept() {
    let api = MockApi::new();
    api.add_interface(DeviceKind::Hid, MOUSE_RAW, None);
    api.add_interface(DeviceKind::Usb, r"\\?\usb#root_hub30#4&1&0", None);
    let records = enumerate_devices(&api, None);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, DeviceKind::Usb);
}

#[test]
fn all_kinds_are_concatenated_in_order() {
    let api = single_hid();
    api.add_interface(DeviceKind::Usb, r"\\?\usb#vid_0781&pid_5581#4C53", None);
    api.add_interface(DeviceKind::Serial, r"\\?\acpi#pnp0501#com1", None);
    let records = enumerate_devices(&api, None);
    let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![DeviceKind::Hid, DeviceKind::Serial, DeviceKind::Usb]);
    assert_eq!(records[1].port_name, "COM1");
    assert!(!records[2].has_identity(), "no hardware ids and no attributes");
}

#[test]
fn failing_kind_does_not_hide_the_others() {
    let api = single_hid();
    api.fail_enumeration(DeviceKind::Serial, NativeError::Os(5));
    api.add_interface(DeviceKind::Usb, r"\\?\usb#vid_0781&pid_5581#1", None);
    assert_eq!(enumerate_devices(&api, None).len(), 2);
}

#[test]
fn repeated_enumeration_is_a_fresh_snapshot() {
    let api = single_hid();
    assert_eq!(enumerate_devices(&api, None).len(), 1);
    api.add_interface(DeviceKind::Usb, r"\\?\usb#vid_0781&pid_5581#1", None);
    assert_eq!(enumerate_devices(&api, None).len(), 2);
}

#[test]
fn records_serialize_to_json() {
    let api = single_hid();
    let records = enumerate_devices(&api, None);
    let json = serde_json::to_value(&records).unwrap();
    assert_eq!(json[0]["vendor_id"], 0x046D);
    assert_eq!(json[0]["kind"], "hid");
}

#[test]
fn walk_error_midway_keeps_earlier_devices() {
    let api = single_hid();
    api.add_interface(DeviceKind::Hid, r"\\?\hid#vid_16c0&pid_05df#1", Some(2));
    api.set_property(2, DeviceProperty::HardwareIds, "HID\\VID_16C0&PID_05DF");
    api.fail_enumeration_at(DeviceKind::Hid, 1, NativeError::Os(1167));
    api.add_interface(DeviceKind::Usb, r"\\?\usb#vid_0403&pid_6001#1", None);

    let records = enumerate_devices(&api, None);
    let ids: Vec<(DeviceKind, u16)> = records.iter().map(|r| (r.kind, r.vendor_id)).collect();
    assert_eq!(ids, vec![(DeviceKind::Hid, 0x046D), (DeviceKind::Usb, 0x0403)]);
}

#[test]
fn hid_records_can_be_filtered_by_usage() {
    let api = MockApi::new();
    let keyboard = r"\\?\hid#vid_046d&pid_c31c&mi_00#1";
    let vendor = r"\\?\hid#vid_046d&pid_c31c&mi_01#1";
    for (path, usage_page, usage) in [(keyboard, 0x01, 0x06), (vendor, 0xFF00, 0x01)] {
        api.add_interface(DeviceKind::Hid, path, None);
        let mut device = MockDevice::hid(0x046D, 0xC31C, ReportLengths::default());
        device.usage = HidUsage { usage_page, usage };
        api.add_device(path, device);
    }

    let records = enumerate_devices(&api, Some(DeviceKind::Hid));
    assert_eq!(records.len(), 2);
    let keyboards: Vec<&str> = records
        .iter()
        .filter(|r| r.matches_usage(0x01, Some(0x06)))
        .map(|r| r.device_path.as_str())
        .collect();
    assert_eq!(keyboards, vec![keyboard]);
    assert_eq!(api.open_handle_count(), 0);
}
