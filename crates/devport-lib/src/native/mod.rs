//! Native capability boundary: everything the core needs from the OS.
//!
//! The enumerator and the sessions never call the platform directly; they
//! go through [`NativeDeviceApi`]. The Windows backend implements it over
//! SetupDi / HID / comm / overlapped file I/O, other hosts get a stub that
//! finds nothing, and [`mock::MockApi`] scripts it in memory for tests.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceKind;

#[doc(hidden)]
pub mod mock;

#[cfg(not(windows))]
pub mod stub;

#[cfg(windows)]
pub mod windows;

// ── Error type ──

/// Failure reported by a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeError {
    /// The enumeration facility has no interfaces for the requested class.
    NoMoreItems,
    /// Benign end-of-data sentinel; a completion carrying it transferred 0 bytes.
    EndOfData,
    /// The operation was cancelled before it completed.
    Aborted,
    /// The capability does not exist on this host.
    Unsupported,
    /// Any other OS error code.
    Os(u32),
}

impl NativeError {
    /// The OS error code, where one exists.
    pub fn code(&self) -> Option<u32> {
        match self {
            NativeError::Os(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeError::NoMoreItems => write!(f, "no more items"),
            NativeError::EndOfData => write!(f, "end of data"),
            NativeError::Aborted => write!(f, "operation aborted"),
            NativeError::Unsupported => write!(f, "not supported on this platform"),
            NativeError::Os(code) => write!(f, "os error {code}"),
        }
    }
}

impl std::error::Error for NativeError {}

// ── Value types ──

/// Opaque reference to a device instance (a devnode on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceRef(pub u32);

/// One entry returned by the interface enumeration facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInterface {
    /// Interface path as the platform reported it. Empty when the detail
    /// query reported a zero required size.
    pub raw_path: String,
    /// Owning device instance, when the detail query could resolve one.
    pub instance: Option<InstanceRef>,
}

/// String properties readable from a device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceProperty {
    /// Hardware id list, NUL-separated.
    HardwareIds,
    FriendlyName,
    /// OS device-instance identifier.
    InstanceId,
    /// `PortName` value under the device's hardware registry key.
    PortName,
}

/// Strings stored in a HID device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HidString {
    Manufacturer,
    Product,
    SerialNumber,
}

/// How a device handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read access, shared, synchronous. Used for brief attribute queries.
    Query,
    /// Read/write, shared read/write, overlapped.
    Shared,
    /// Read/write, no sharing, overlapped.
    Exclusive,
}

/// HID identity as reported by the class driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidAttributes {
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

/// Top-level collection usage from the HID capabilities. 0 = unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidUsage {
    pub usage_page: u16,
    pub usage: u16,
}

/// Negotiated HID report sizes in bytes (report id byte included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportLengths {
    pub input: u16,
    pub output: u16,
    pub feature: u16,
}

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => write!(f, "none"),
            Parity::Even => write!(f, "even"),
            Parity::Odd => write!(f, "odd"),
        }
    }
}

/// Serial line settings. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub baud_rate: u32,
    /// 7 or 8.
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2.
    pub stop_bits: u8,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl LineConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baud rate must be positive".into());
        }
        if !matches!(self.data_bits, 7 | 8) {
            return Err(format!("data bits must be 7 or 8, got {}", self.data_bits));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(format!("stop bits must be 1 or 2, got {}", self.stop_bits));
        }
        Ok(())
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.data_bits, parity, self.stop_bits
        )
    }
}

/// Result of issuing an overlapped read or write.
#[derive(Debug)]
pub enum Begin<P> {
    /// Finished synchronously with this many bytes.
    Completed(usize),
    /// Still in flight; the token must be waited on and reaped.
    Pending(P),
}

/// Which signal ended a wait on a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Closed,
    TimedOut,
}

// ── Capability trait ──

/// Every native call the core depends on.
///
/// Implementations must be shareable across threads: one session's handle
/// and close signal are used by several in-flight operations at once.
pub trait NativeDeviceApi: Send + Sync {
    type Handle: Copy + Send + Sync + fmt::Debug;
    type Signal: Send + Sync;
    /// One in-flight overlapped operation. Borrows the caller's buffer for
    /// `'a`; dropping it without [`get_result`](Self::get_result) must still
    /// leave the buffer unused by the OS.
    type Pending<'a>: Send
    where
        Self: 'a;

    // enumeration

    fn enumerate_interfaces(&self, kind: DeviceKind)
    -> Result<Vec<RawInterface>, NativeError>;
    fn string_property(&self, instance: InstanceRef, property: DeviceProperty) -> Option<String>;
    /// Filesystem format of a volume root such as `C:\`.
    fn filesystem_name(&self, root: &str) -> Option<String>;

    // handles

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::Handle, NativeError>;
    fn close_handle(&self, handle: Self::Handle);

    // HID

    fn hid_attributes(&self, handle: Self::Handle) -> Result<HidAttributes, NativeError>;
    fn hid_report_lengths(&self, handle: Self::Handle) -> Result<ReportLengths, NativeError>;
    fn hid_usage(&self, handle: Self::Handle) -> Result<HidUsage, NativeError>;
    fn hid_set_input_buffers(&self, handle: Self::Handle, count: u32) -> Result<(), NativeError>;
    fn hid_get_feature(&self, handle: Self::Handle, buf: &mut [u8]) -> Result<(), NativeError>;
    fn hid_set_feature(&self, handle: Self::Handle, buf: &[u8]) -> Result<(), NativeError>;
    fn hid_string(&self, handle: Self::Handle, which: HidString) -> Option<String>;

    // serial

    fn apply_line_config(&self, handle: Self::Handle, config: &LineConfig)
    -> Result<(), NativeError>;
    /// Abort outstanding transfers and clear both driver buffers.
    fn purge(&self, handle: Self::Handle) -> Result<(), NativeError>;

    // signals

    /// Create a manual-reset, initially clear signal.
    fn create_signal(&self) -> Result<Self::Signal, NativeError>;
    fn raise_signal(&self, signal: &Self::Signal);
    /// Release the signal's native resource. The value is dead afterwards.
    fn free_signal(&self, signal: &Self::Signal);

    // overlapped I/O

    fn begin_read<'a>(
        &'a self,
        handle: Self::Handle,
        buf: &'a mut [u8],
    ) -> Result<Begin<Self::Pending<'a>>, NativeError>;
    fn begin_write<'a>(
        &'a self,
        handle: Self::Handle,
        buf: &'a [u8],
    ) -> Result<Begin<Self::Pending<'a>>, NativeError>;
    /// Wait for the operation or the close signal, whichever fires first.
    /// `None` waits indefinitely. Completion wins a tie.
    fn wait(
        &self,
        pending: &Self::Pending<'_>,
        close: &Self::Signal,
        timeout: Option<Duration>,
    ) -> WaitOutcome;
    fn cancel(&self, handle: Self::Handle, pending: &Self::Pending<'_>);
    /// Block until the operation has finished and return its byte count.
    fn get_result(
        &self,
        handle: Self::Handle,
        pending: Self::Pending<'_>,
    ) -> Result<usize, NativeError>;
}

// ── Interface walk ──

/// Drive an index-based interface enumeration until `next` runs out.
///
/// A failure at index 0 is the result of the whole walk. A later
/// `NoMoreItems` ends it normally; any other later failure is logged and
/// ends it with the interfaces collected so far.
pub(crate) fn walk_interfaces(
    mut next: impl FnMut(u32) -> Result<RawInterface, NativeError>,
) -> Result<Vec<RawInterface>, NativeError> {
    let mut interfaces = Vec::new();
    let mut index = 0u32;
    loop {
        match next(index) {
            Ok(iface) => interfaces.push(iface),
            Err(e) if index == 0 => return Err(e),
            Err(NativeError::NoMoreItems) => break,
            Err(e) => {
                log::warn!("interface walk stopped at index {index}: {e}");
                break;
            }
        }
        index += 1;
    }
    Ok(interfaces)
}

// ── Platform selection ──

/// Native backend for the current host.
#[cfg(windows)]
pub type PlatformApi = windows::WindowsApi;
#[cfg(not(windows))]
pub type PlatformApi = stub::UnsupportedApi;

/// Construct the native backend for the current host.
pub fn platform_api() -> std::sync::Arc<PlatformApi> {
    std::sync::Arc::new(PlatformApi::default())
}
