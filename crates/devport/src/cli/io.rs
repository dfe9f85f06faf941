//! `read` / `write` subcommands: one raw transfer through a device session.

use std::path::Path;

use devport_lib::native::{PlatformApi, platform_api};
use devport_lib::{DeviceIo, DeviceSession};

use super::{
    DeviceError, DeviceKind, ReadOutput, Result, WriteOutput, format_hex, parse_hex, print_json,
};

fn open_session(
    path: &str,
    kind: DeviceKind,
    config_path: Option<&Path>,
) -> Result<DeviceSession<PlatformApi>> {
    let options = super::load_config(config_path).session_options()?;
    Ok(DeviceSession::open_path(platform_api(), kind, path, &options)?)
}

pub(super) fn cmd_read(
    path: &str,
    kind: DeviceKind,
    count: usize,
    timeout: Option<i64>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let session = open_session(path, kind, config_path)?;
    if let Some(ms) = timeout {
        session.timeouts().set_read_ms(ms);
    }
    let mut buf = vec![0u8; count];
    let n = session.read(&mut buf)?;
    session.close();
    let data = &buf[..n];

    if json {
        return print_json(&ReadOutput {
            path: path.to_string(),
            kind,
            count: n,
            data: format_hex(data),
        });
    }
    println!("Read {n} byte{} from {path}", if n == 1 { "" } else { "s" });
    if n > 0 {
        println!("  {}", format_hex(data));
    }
    Ok(())
}

pub(super) fn cmd_write(
    path: &str,
    kind: DeviceKind,
    hex: &str,
    timeout: Option<i64>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let bytes = parse_hex(hex).map_err(|e| DeviceError::InvalidArgument(format!("write: {e}")))?;
    let session = open_session(path, kind, config_path)?;
    if let Some(ms) = timeout {
        session.timeouts().set_write_ms(ms);
    }
    session.write(&bytes)?;
    session.close();

    if json {
        return print_json(&WriteOutput {
            path: path.to_string(),
            kind,
            count: bytes.len(),
        });
    }
    println!(
        "Wrote {} byte{} to {path}",
        bytes.len(),
        if bytes.len() == 1 { "" } else { "s" }
    );
    Ok(())
}
