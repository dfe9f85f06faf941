//! CLI subcommands: device listing, config display, raw read/write.

mod config_cmd;
mod devices;
mod io;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use devport_lib::config::Config;
pub(super) use devport_lib::error::Result;
pub(super) use devport_lib::{DeviceError, DeviceKind, DeviceRecord};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {}", format_kv(key, value, w - 2));
}

/// Print any serializable value as pretty JSON.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

/// Load config from `custom_path` or the platform default, logging parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

/// Parse hex bytes. Whitespace, `:` and `,` separate bytes; `0x` prefixes
/// are accepted per byte or once for the whole string.
pub(super) fn parse_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    let mut digits = String::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ':' || c == ',') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.len() % 2 == 1 {
            digits.push('0');
        }
        digits.push_str(token);
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digit '{bad}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

/// clap value parser for a 16-bit id written as hex, with or without `0x`.
fn parse_u16_hex(text: &str) -> std::result::Result<u16, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16)
        .map_err(|e| format!("invalid 16-bit hex value \"{text}\": {e}"))
}

pub(super) fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DeviceRecord>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ReadOutput {
    pub path: String,
    pub kind: DeviceKind,
    pub count: usize,
    pub data: String,
}

#[derive(Serialize)]
pub(super) struct WriteOutput {
    pub path: String,
    pub kind: DeviceKind,
    pub count: usize,
}

#[derive(Subcommand)]
pub enum Command {
    /// List present device interfaces
    Devices {
        /// Only list one kind (hid, serial, usb)
        #[arg(long)]
        kind: Option<DeviceKind>,
        /// Only list HID devices with this top-level usage page (hex)
        #[arg(long, value_parser = parse_u16_hex)]
        usage_page: Option<u16>,
        /// Narrow --usage-page to one usage (hex)
        #[arg(long, value_parser = parse_u16_hex, requires = "usage_page")]
        usage: Option<u16>,
    },

    /// Show current configuration and file path
    Config {
        /// Write the effective settings to the config file first
        #[arg(long)]
        init: bool,
    },

    /// Read raw bytes from a device interface
    Read {
        /// Device interface path, as printed by `devices`
        path: String,
        /// Device kind (hid, serial, usb)
        #[arg(long)]
        kind: DeviceKind,
        /// Maximum number of bytes to read
        #[arg(long, default_value_t = 64)]
        count: usize,
        /// Read timeout in milliseconds, negative waits indefinitely (default: from config)
        #[arg(long, allow_hyphen_values = true)]
        timeout: Option<i64>,
    },

    /// Write raw bytes to a device interface
    Write {
        /// Device interface path, as printed by `devices`
        path: String,
        /// Device kind (hid, serial, usb)
        #[arg(long)]
        kind: DeviceKind,
        /// Bytes as hex, e.g. "00 01 ff" or "0x0001ff"
        hex: String,
        /// Write timeout in milliseconds, negative waits indefinitely (default: from config)
        #[arg(long, allow_hyphen_values = true)]
        timeout: Option<i64>,
    },
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Devices {
            kind,
            usage_page,
            usage,
        } => devices::cmd_devices(kind, usage_page.map(|page| (page, usage)), json),
        Command::Config { init } => config_cmd::cmd_config(init, json, config_path),
        Command::Read {
            path,
            kind,
            count,
            timeout,
        } => io::cmd_read(&path, kind, count, timeout, json, config_path),
        Command::Write {
            path,
            kind,
            hex,
            timeout,
        } => io::cmd_write(&path, kind, &hex, timeout, json, config_path),
    }
}


#[cfg(test)]
mod hex_tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_common_spellings() {
        assert_eq!(parse_hex("00 01 ff").unwrap(), vec![0x00, 0x01, 0xFF]);
        assert_eq!(parse_hex("0x0001FF").unwrap(), vec![0x00, 0x01, 0xFF]);
        assert_eq!(parse_hex("de:ad,be:ef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex("0x1 0x2").unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn parse_hex_empty_is_no_bytes() {
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("  ").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_garbage() {
        assert!(parse_hex("zz").unwrap_err().contains("'z'"));
        assert!(parse_hex("01 0g").is_err());
    }

    #[test]
    fn parse_u16_hex_accepts_prefix() {
        assert_eq!(parse_u16_hex("0xFF00"), Ok(0xFF00));
        assert_eq!(parse_u16_hex("1"), Ok(0x01));
        assert!(parse_u16_hex("10000").is_err());
        assert!(parse_u16_hex("zz").unwrap_err().contains("zz"));
    }

    #[test]
    fn format_hex_is_lowercase_spaced() {
        assert_eq!(format_hex(&[0x00, 0xAB, 0x10]), "00 ab 10");
        assert_eq!(format_hex(&[]), "");
    }
}
