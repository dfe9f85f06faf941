//! Device records and the I/O error taxonomy.

use std::fmt;

use serde::Serialize;

use crate::native::NativeError;

// ── Error type ──

/// Session and handle errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the operation or step (e.g. `"open"`, `"set_feature"`) and
/// *details* describes what went wrong.
#[derive(Debug)]
pub enum DeviceError {
    /// Buffer/offset/count precondition violated. No native call was made.
    InvalidArgument(String),
    /// The native open returned no usable handle.
    HandleInvalid(String),
    /// The session was closed before or during the operation.
    Disposed,
    /// The wait exceeded the configured timeout; the operation was cancelled.
    TimedOut,
    /// A native call failed.
    IoFailure {
        context: &'static str,
        source: NativeError,
    },
    /// Fewer bytes reached the device than were requested.
    ShortWrite { expected: usize, transferred: usize },
    /// The device cannot perform the operation (e.g. zero-length reports).
    NotSupported(String),
}

impl DeviceError {
    pub(crate) fn io(context: &'static str, source: NativeError) -> Self {
        DeviceError::IoFailure { context, source }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            DeviceError::HandleInvalid(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::Disposed => write!(f, "Device session is closed"),
            DeviceError::TimedOut => write!(f, "Operation timed out"),
            DeviceError::IoFailure { context, source } => {
                write!(f, "I/O failed: {context}: {source}")
            }
            DeviceError::ShortWrite {
                expected,
                transferred,
            } => write!(
                f,
                "Short write: {transferred} of {expected} bytes transferred"
            ),
            DeviceError::NotSupported(e) => write!(f, "Not supported: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::IoFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DeviceError> for std::io::Error {
    fn from(e: DeviceError) -> Self {
        use std::io::ErrorKind;
        let kind = match &e {
            DeviceError::InvalidArgument(_) => ErrorKind::InvalidInput,
            DeviceError::HandleInvalid(_) => ErrorKind::NotFound,
            DeviceError::Disposed => ErrorKind::BrokenPipe,
            DeviceError::TimedOut => ErrorKind::TimedOut,
            DeviceError::IoFailure { .. } => ErrorKind::Other,
            DeviceError::ShortWrite { .. } => ErrorKind::WriteZero,
            DeviceError::NotSupported(_) => ErrorKind::Unsupported,
        };
        std::io::Error::new(kind, e)
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Device record ──

/// Device class an interface belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Hid,
    Serial,
    Usb,
}

impl DeviceKind {
    /// Enumeration order when every kind is requested.
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Hid, DeviceKind::Serial, DeviceKind::Usb];
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Hid => write!(f, "HID"),
            DeviceKind::Serial => write!(f, "Serial"),
            DeviceKind::Usb => write!(f, "USB"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hid" => Ok(DeviceKind::Hid),
            "serial" | "com" => Ok(DeviceKind::Serial),
            "usb" => Ok(DeviceKind::Usb),
            other => Err(format!("unknown device kind \"{other}\" (expected hid, serial or usb)")),
        }
    }
}

/// Snapshot of one enumerated device interface.
///
/// Produced fresh by every enumeration pass and never mutated afterwards.
/// Unresolvable optional strings are empty, not absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub kind: DeviceKind,
    /// Canonical interface path (`\\?\...`). Never empty.
    pub device_path: String,
    /// 0 = unknown. Never both 0 for HID.
    pub vendor_id: u16,
    pub product_id: u16,
    /// HID release number, 0 when unknown.
    pub version: u16,
    /// HID top-level collection usage page, 0 when unknown or not HID.
    pub usage_page: u16,
    pub usage: u16,
    pub instance_id: String,
    pub friendly_name: String,
    pub port_name: String,
    pub filesystem_name: String,
}

impl DeviceRecord {
    /// Whether a vendor/product id pair was resolved.
    pub fn has_identity(&self) -> bool {
        self.vendor_id != 0 || self.product_id != 0
    }

    /// Whether the HID top-level collection is `usage_page`, and `usage`
    /// when one is given. Records with an unknown usage page never match.
    pub fn matches_usage(&self, usage_page: u16, usage: Option<u16>) -> bool {
        self.usage_page != 0
            && self.usage_page == usage_page
            && usage.is_none_or(|u| u == self.usage)
    }

    /// Best human-readable label: friendly name, then port name, then path.
    pub fn label(&self) -> &str {
        [&self.friendly_name, &self.port_name]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or(&self.device_path)
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04X}:{:04X}",
            self.kind, self.vendor_id, self.product_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: DeviceKind) -> DeviceRecord {
        DeviceRecord {
            kind,
            device_path: r"\\?\hid#vid_046d&pid_c52b#7&1&0".into(),
            vendor_id: 0x046D,
            product_id: 0xC52B,
            version: 0x1201,
            usage_page: 0x01,
            usage: 0x02,
            instance_id: r"HID\VID_046D&PID_C52B\7&1&0".into(),
            friendly_name: String::new(),
            port_name: String::new(),
            filesystem_name: String::new(),
        }
    }

    // ── DeviceError ──

    #[test]
    fn display_short_write() {
        let e = DeviceError::ShortWrite {
            expected: 64,
            transferred: 32,
        };
        assert_eq!(e.to_string(), "Short write: 32 of 64 bytes transferred");
    }

    #[test]
    fn display_io_failure_names_context() {
        let e = DeviceError::io("read", NativeError::Os(31));
        assert_eq!(e.to_string(), "I/O failed: read: os error 31");
    }

    #[test]
    fn io_failure_chains_native_source() {
        let e = DeviceError::io("write", NativeError::Os(1167));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("1167"));
    }

    #[test]
    fn disposed_and_timed_out_are_distinct() {
        assert_ne!(
            DeviceError::Disposed.to_string(),
            DeviceError::TimedOut.to_string()
        );
    }

    #[test]
    fn into_io_error_kinds() {
        use std::io::ErrorKind;
        let cases = [
            (DeviceError::TimedOut, ErrorKind::TimedOut),
            (DeviceError::Disposed, ErrorKind::BrokenPipe),
            (DeviceError::InvalidArgument("x".into()), ErrorKind::InvalidInput),
            (
                DeviceError::ShortWrite {
                    expected: 2,
                    transferred: 1,
                },
                ErrorKind::WriteZero,
            ),
            (DeviceError::NotSupported("x".into()), ErrorKind::Unsupported),
        ];
        for (e, kind) in cases {
            let io: std::io::Error = e.into();
            assert_eq!(io.kind(), kind);
        }
    }

    // ── DeviceKind ──

    #[test]
    fn kind_serializes_lowercase() {
        let names: Vec<String> = DeviceKind::ALL
            .iter()
            .map(|k| serde_json::to_string(k).unwrap())
            .collect();
        assert_eq!(names, ["\"hid\"", "\"serial\"", "\"usb\""]);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("HID".parse::<DeviceKind>(), Ok(DeviceKind::Hid));
        assert_eq!("com".parse::<DeviceKind>(), Ok(DeviceKind::Serial));
        assert_eq!(" usb ".parse::<DeviceKind>(), Ok(DeviceKind::Usb));
        assert!("bluetooth".parse::<DeviceKind>().is_err());
    }

    // ── DeviceRecord ──

    #[test]
    fn record_display_uses_uppercase_hex() {
        assert_eq!(record(DeviceKind::Hid).to_string(), "HID 046D:C52B");
    }

    #[test]
    fn record_serializes() {
        let json = serde_json::to_string(&record(DeviceKind::Hid)).unwrap();
        assert!(json.contains("\"kind\":\"hid\""), "{json}");
        assert!(json.contains("\"device_path\""));
        assert!(json.contains("\"vendor_id\":1133"));
        assert!(json.contains("\"usage_page\":1"));
        assert!(json.contains("\"usage\":2"));
    }

    #[test]
    fn usage_filter_needs_known_page() {
        let mut r = record(DeviceKind::Hid);
        assert!(r.matches_usage(0x01, None));
        assert!(r.matches_usage(0x01, Some(0x02)));
        assert!(!r.matches_usage(0x01, Some(0x06)));
        assert!(!r.matches_usage(0xFF00, None));
        r.usage_page = 0;
        r.usage = 0;
        assert!(!r.matches_usage(0, None));
    }

    #[test]
    fn label_prefers_friendly_then_port_then_path() {
        let mut r = record(DeviceKind::Serial);
        assert_eq!(r.label(), r.device_path);
        r.port_name = "COM3".into();
        assert_eq!(r.label(), "COM3");
        r.friendly_name = "USB Serial Device (COM3)".into();
        assert_eq!(r.label(), "USB Serial Device (COM3)");
    }

    #[test]
    fn identity_requires_a_nonzero_id() {
        let mut r = record(DeviceKind::Usb);
        assert!(r.has_identity());
        r.vendor_id = 0;
        r.product_id = 0;
        assert!(!r.has_identity());
    }
}
