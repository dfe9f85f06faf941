//! Open device sessions: one tagged variant per device kind.
//!
//! Every variant owns a [`HandleGuard`](crate::handle::HandleGuard) and runs
//! each read and write under a lease from it, so a concurrent `close` never
//! frees the handle under an in-flight operation. Sessions close themselves
//! when dropped.

use std::io;
use std::ops::Range;
use std::sync::Arc;

use crate::device::{DeviceError, DeviceKind, DeviceRecord, Result};
use crate::native::{LineConfig, NativeDeviceApi};
use crate::overlapped::{DEFAULT_TIMEOUT_MS, IoTimeouts};

pub mod hid;
pub mod serial;
pub mod usb;

pub use hid::HidSession;
pub use serial::SerialSession;
pub use usb::UsbSession;

/// Input report ring size requested from the HID driver at open.
pub const DEFAULT_HID_INPUT_BUFFERS: u32 = 512;

/// Settings applied when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Milliseconds; negative waits indefinitely.
    pub read_timeout_ms: i64,
    /// Milliseconds; negative waits indefinitely.
    pub write_timeout_ms: i64,
    pub hid_input_buffers: u32,
    /// Query HID report lengths at open instead of on first I/O.
    pub eager_report_lengths: bool,
    /// Initial serial line settings, applied before the first I/O.
    pub line: LineConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            hid_input_buffers: DEFAULT_HID_INPUT_BUFFERS,
            eager_report_lengths: false,
            line: LineConfig::default(),
        }
    }
}

impl SessionOptions {
    pub(crate) fn timeouts(&self) -> IoTimeouts {
        IoTimeouts::new(self.read_timeout_ms, self.write_timeout_ms)
    }
}

/// Byte-stream operations shared by every session variant.
pub trait DeviceIo {
    /// Read up to `buf.len()` bytes. Returns the number of bytes copied.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `buf`. A transfer that falls short fails with `ShortWrite`.
    fn write(&self, buf: &[u8]) -> Result<()>;

    /// Request close. Returns `false` if the session was already closed.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn timeouts(&self) -> &IoTimeouts;

    /// Read into `buf[offset..offset + count]`.
    fn read_at(&self, buf: &mut [u8], offset: usize, count: usize) -> Result<usize> {
        let range = checked_range("read", buf.len(), offset, count)?;
        self.read(&mut buf[range])
    }

    /// Write `buf[offset..offset + count]`.
    fn write_at(&self, buf: &[u8], offset: usize, count: usize) -> Result<()> {
        let range = checked_range("write", buf.len(), offset, count)?;
        self.write(&buf[range])
    }
}

/// Validate an `(offset, count)` window against a buffer of `len` bytes.
pub fn checked_range(
    context: &str,
    len: usize,
    offset: usize,
    count: usize,
) -> Result<Range<usize>> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(DeviceError::InvalidArgument(format!(
            "{context}: offset {offset} + count {count} exceeds buffer length {len}"
        ))),
    }
}

// ── Tagged session ──

/// An open session of any kind.
pub enum DeviceSession<A: NativeDeviceApi> {
    Hid(HidSession<A>),
    Serial(SerialSession<A>),
    Usb(UsbSession<A>),
}

impl<A: NativeDeviceApi> DeviceSession<A> {
    /// Open the device described by an enumerated record.
    pub fn open(api: Arc<A>, record: &DeviceRecord, options: &SessionOptions) -> Result<Self> {
        Self::open_path(api, record.kind, &record.device_path, options)
    }

    /// Open `path` as a session of the given kind.
    pub fn open_path(
        api: Arc<A>,
        kind: DeviceKind,
        path: &str,
        options: &SessionOptions,
    ) -> Result<Self> {
        if path.is_empty() {
            return Err(DeviceError::InvalidArgument("open: empty device path".into()));
        }
        Ok(match kind {
            DeviceKind::Hid => DeviceSession::Hid(HidSession::open(api, path, options)?),
            DeviceKind::Serial => DeviceSession::Serial(SerialSession::open(api, path, options)?),
            DeviceKind::Usb => DeviceSession::Usb(UsbSession::open(api, path, options)?),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceSession::Hid(_) => DeviceKind::Hid,
            DeviceSession::Serial(_) => DeviceKind::Serial,
            DeviceSession::Usb(_) => DeviceKind::Usb,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            DeviceSession::Hid(s) => s.path(),
            DeviceSession::Serial(s) => s.path(),
            DeviceSession::Usb(s) => s.path(),
        }
    }

    pub fn as_hid(&self) -> Option<&HidSession<A>> {
        match self {
            DeviceSession::Hid(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_serial(&self) -> Option<&SerialSession<A>> {
        match self {
            DeviceSession::Serial(s) => Some(s),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn DeviceIo {
        match self {
            DeviceSession::Hid(s) => s,
            DeviceSession::Serial(s) => s,
            DeviceSession::Usb(s) => s,
        }
    }
}

impl<A: NativeDeviceApi> DeviceIo for DeviceSession<A> {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner().read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        self.inner().write(buf)
    }

    fn close(&self) -> bool {
        self.inner().close()
    }

    fn is_closed(&self) -> bool {
        self.inner().is_closed()
    }

    fn timeouts(&self) -> &IoTimeouts {
        self.inner().timeouts()
    }
}

// ── std::io adapters ──

macro_rules! impl_std_io {
    ($($session:ident),+) => {$(
        impl<A: NativeDeviceApi> io::Read for &$session<A> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                Ok(DeviceIo::read(*self, buf)?)
            }
        }

        impl<A: NativeDeviceApi> io::Write for &$session<A> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                DeviceIo::write(*self, buf)?;
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
    )+};
}

impl_std_io!(HidSession, SerialSession, UsbSession, DeviceSession);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::{MockApi, MockDevice, MockIo};
    use crate::native::{OpenMode, ReportLengths};
    use std::io::{Read, Write};

    const HID: &str = r"\\?\hid#vid_046d&pid_c52b#1";
    const COM: &str = r"\\?\acpi#pnp0501#1#{86e0d1e0-8089-11d0-9ce4-08003e301f73}";
    const USB: &str = r"\\?\usb#vid_0403&pid_6001#a1";

    fn api() -> Arc<MockApi> {
        let api = Arc::new(MockApi::new());
        api.add_device(
            HID,
            MockDevice::hid(
                0x046D,
                0xC52B,
                ReportLengths {
                    input: 8,
                    output: 8,
                    feature: 4,
                },
            ),
        );
        api.add_device(COM, MockDevice::default());
        api.add_device(USB, MockDevice::default());
        api
    }

    #[test]
    fn checked_range_accepts_window_inside_buffer() {
        assert_eq!(checked_range("read", 10, 2, 8).unwrap(), 2..10);
        assert_eq!(checked_range("read", 0, 0, 0).unwrap(), 0..0);
    }

    #[test]
    fn checked_range_rejects_overflow() {
        let err = checked_range("write", 10, 4, 8).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: write: offset 4 + count 8 exceeds buffer length 10"
        );
        assert!(checked_range("read", 10, usize::MAX, 2).is_err());
    }

    #[test]
    fn open_dispatches_on_kind() {
        let api = api();
        let opts = SessionOptions::default();
        let hid = DeviceSession::open_path(api.clone(), DeviceKind::Hid, HID, &opts).unwrap();
        let com = DeviceSession::open_path(api.clone(), DeviceKind::Serial, COM, &opts).unwrap();
        let usb = DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &opts).unwrap();
        assert_eq!(hid.kind(), DeviceKind::Hid);
        assert_eq!(com.kind(), DeviceKind::Serial);
        assert_eq!(usb.kind(), DeviceKind::Usb);
        assert!(hid.as_hid().is_some());
        assert!(com.as_serial().is_some());
        assert_eq!(usb.path(), USB);

        let modes: Vec<OpenMode> = api.opens().into_iter().map(|(_, m)| m).collect();
        assert_eq!(
            modes,
            vec![OpenMode::Shared, OpenMode::Exclusive, OpenMode::Shared]
        );
    }

    #[test]
    fn open_from_record_uses_record_path() {
        let api = api();
        let record = DeviceRecord {
            kind: DeviceKind::Usb,
            device_path: USB.into(),
            vendor_id: 0x0403,
            product_id: 0x6001,
            version: 0,
            usage_page: 0,
            usage: 0,
            instance_id: String::new(),
            friendly_name: String::new(),
            port_name: String::new(),
            filesystem_name: String::new(),
        };
        let session = DeviceSession::open(api.clone(), &record, &SessionOptions::default()).unwrap();
        assert_eq!(session.path(), USB);
    }

    #[test]
    fn open_rejects_empty_path() {
        let err = DeviceSession::open_path(api(), DeviceKind::Usb, "", &SessionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
    }

    #[test]
    fn read_at_checks_window_before_io() {
        let api = api();
        let session =
            DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &SessionOptions::default())
                .unwrap();
        let mut buf = [0u8; 4];
        let err = session.read_at(&mut buf, 3, 2).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidArgument(_)));
        assert_eq!(api.pending_count(), 0);
    }

    #[test]
    fn read_at_fills_window() {
        let api = api();
        api.push_read(USB, MockIo::data(b"zz"));
        let session =
            DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &SessionOptions::default())
                .unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(session.read_at(&mut buf, 2, 4).unwrap(), 2);
        assert_eq!(buf, [0, 0, b'z', b'z', 0, 0]);
    }

    #[test]
    fn std_io_adapters_map_errors() {
        let api = api();
        let session =
            DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &SessionOptions::default())
                .unwrap();
        (&session).write_all(b"ping").unwrap();
        assert_eq!(api.written(USB), vec![b"ping".to_vec()]);

        session.close();
        let mut buf = [0u8; 4];
        let err = Read::read(&mut &session, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn drop_closes_the_handle() {
        let api = api();
        let session =
            DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &SessionOptions::default())
                .unwrap();
        assert_eq!(api.open_handle_count(), 1);
        drop(session);
        assert_eq!(api.open_handle_count(), 0);
        assert_eq!(api.signal_frees(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let api = api();
        let session =
            DeviceSession::open_path(api.clone(), DeviceKind::Usb, USB, &SessionOptions::default())
                .unwrap();
        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        drop(session);
        assert_eq!(api.handle_frees(), 1);
    }
}
