//! `devices` subcommand: list present device interfaces.

use devport_lib::enumerate_devices;
use devport_lib::native::platform_api;

use super::{DeviceKind, DevicesOutput, Result, print_json};

pub(super) fn cmd_devices(
    kind: Option<DeviceKind>,
    usage: Option<(u16, Option<u16>)>,
    json: bool,
) -> Result<()> {
    let api = platform_api();
    let mut devices = enumerate_devices(&*api, kind);
    if let Some((usage_page, usage)) = usage {
        devices.retain(|d| d.matches_usage(usage_page, usage));
    }

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!(
        "Found {} device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {}  {}", i + 1, dev, dev.label());
        println!("      Path: {}", dev.device_path);
        if dev.usage_page != 0 {
            println!("      Usage: {:04X}:{:04X}", dev.usage_page, dev.usage);
        }
        if !dev.port_name.is_empty() {
            println!("      Port: {}", dev.port_name);
        }
        if !dev.filesystem_name.is_empty() {
            println!("      Filesystem: {}", dev.filesystem_name);
        }
    }

    Ok(())
}
