//! Windows backend: SetupDi / CfgMgr enumeration, HID class driver calls,
//! comm state and overlapped file I/O.

use std::marker::PhantomData;
use std::mem;
use std::time::Duration;

use windows::Win32::Devices::Communication::{
    COMMTIMEOUTS, DCB, EVENPARITY, GetCommState, NOPARITY, ODDPARITY, ONESTOPBIT, PURGE_RXABORT,
    PURGE_RXCLEAR, PURGE_TXABORT, PURGE_TXCLEAR, PurgeComm, SetCommState, SetCommTimeouts,
    TWOSTOPBITS,
};
use windows::Win32::Devices::DeviceAndDriverInstallation::{
    CM_DRP_FRIENDLYNAME, CM_DRP_HARDWAREID, CM_Get_DevNode_Registry_PropertyW, CM_Get_Device_IDW,
    CM_Get_Device_ID_Size, CM_Open_DevNode_Key, CM_REGISTRY_HARDWARE, CR_BUFFER_SMALL, CR_SUCCESS,
    DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO, RegDisposition_OpenExisting,
    SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W, SP_DEVINFO_DATA,
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW,
    SetupDiGetDeviceInterfaceDetailW,
};
use windows::Win32::Devices::HumanInterfaceDevice::{
    HIDD_ATTRIBUTES, HIDP_CAPS, HIDP_STATUS_SUCCESS, HidD_FreePreparsedData, HidD_GetAttributes,
    HidD_GetFeature, HidD_GetManufacturerString, HidD_GetPreparsedData, HidD_GetProductString,
    HidD_GetSerialNumberString, HidD_SetFeature, HidD_SetNumInputBuffers, HidP_GetCaps,
    PHIDP_PREPARSED_DATA,
};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_HANDLE_EOF, ERROR_IO_PENDING, ERROR_NO_MORE_ITEMS,
    ERROR_OPERATION_ABORTED, ERROR_SUCCESS, GENERIC_READ, GENERIC_WRITE, GetLastError, HANDLE,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_OVERLAPPED, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE,
    FILE_SHARE_READ, FILE_SHARE_WRITE, GetVolumeInformationW, OPEN_EXISTING, ReadFile, WriteFile,
};
use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows::Win32::System::Registry::{HKEY, KEY_READ, RegCloseKey, RegQueryValueExW};
use windows::Win32::System::Threading::{CreateEventW, INFINITE, SetEvent, WaitForMultipleObjects};
use windows::core::{GUID, PCWSTR};

use super::{
    Begin, DeviceProperty, HidAttributes, HidString, HidUsage, InstanceRef, LineConfig,
    NativeDeviceApi, NativeError, OpenMode, Parity, RawInterface, ReportLengths, WaitOutcome,
};
use crate::device::DeviceKind;

// ── Interface classes ──

const GUID_DEVINTERFACE_HID: GUID = GUID::from_u128(0x4d1e55b2_f16f_11cf_88cb_001111000030);
const GUID_DEVINTERFACE_COMPORT: GUID = GUID::from_u128(0x86e0d1e0_8089_11d0_9ce4_08003e301f73);
const GUID_DEVINTERFACE_USB_DEVICE: GUID = GUID::from_u128(0xa5dcbf10_6530_11d2_901f_00c04fb951ed);

fn interface_class(kind: DeviceKind) -> GUID {
    match kind {
        DeviceKind::Hid => GUID_DEVINTERFACE_HID,
        DeviceKind::Serial => GUID_DEVINTERFACE_COMPORT,
        DeviceKind::Usb => GUID_DEVINTERFACE_USB_DEVICE,
    }
}

/// USB HID strings are at most 126 UTF-16 units plus terminator.
const HID_STRING_UNITS: usize = 127;

// ── Error mapping ──

fn from_code(code: u32) -> NativeError {
    match code {
        c if c == ERROR_NO_MORE_ITEMS.0 => NativeError::NoMoreItems,
        c if c == ERROR_HANDLE_EOF.0 => NativeError::EndOfData,
        c if c == ERROR_OPERATION_ABORTED.0 => NativeError::Aborted,
        c => NativeError::Os(c),
    }
}

/// Unwrap a Win32 code from an `HRESULT_FROM_WIN32` value.
fn from_error(e: &windows::core::Error) -> NativeError {
    let hr = e.code().0 as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        from_code(hr & 0xFFFF)
    } else {
        NativeError::Os(hr)
    }
}

fn is_pending(e: &windows::core::Error) -> bool {
    from_error(e) == NativeError::Os(ERROR_IO_PENDING.0)
}

fn last_error() -> NativeError {
    // SAFETY: reads the calling thread's last-error value.
    from_code(unsafe { GetLastError() }.0)
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Read a NUL-terminated wide string out of a buffer.
fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Read a REG_MULTI_SZ / REG_SZ byte buffer, keeping interior NULs.
fn from_wide_bytes(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}

// ── Handle newtypes ──

/// Device handle. Raw handles are process-wide and usable from any thread.
#[derive(Debug, Clone, Copy)]
pub struct WinHandle(HANDLE);

// SAFETY: a file handle may be used from any thread in the owning process.
unsafe impl Send for WinHandle {}
unsafe impl Sync for WinHandle {}

/// Manual-reset event used as a close signal.
#[derive(Debug)]
pub struct WinEvent(HANDLE);

// SAFETY: event handles may be signalled and waited on from any thread.
unsafe impl Send for WinEvent {}
unsafe impl Sync for WinEvent {}

fn new_event() -> Result<HANDLE, NativeError> {
    // SAFETY: no security attributes, unnamed event.
    unsafe { CreateEventW(None, true, false, PCWSTR::null()) }.map_err(|e| from_error(&e))
}

/// One in-flight overlapped transfer.
///
/// The `OVERLAPPED` block is boxed so its address stays fixed while the
/// kernel owns it. Dropping an unreaped operation cancels it and waits for
/// the kernel to let go of both the block and the borrowed buffer.
pub struct WinPending<'a> {
    handle: HANDLE,
    overlapped: Box<OVERLAPPED>,
    reaped: bool,
    _buf: PhantomData<&'a mut [u8]>,
}

// SAFETY: the OVERLAPPED block and event are only touched through &self/&mut
// self; the kernel side is thread-agnostic.
unsafe impl Send for WinPending<'_> {}

impl WinPending<'_> {
    fn event(&self) -> HANDLE {
        self.overlapped.hEvent
    }

    /// Block until the kernel is done with the transfer.
    fn reap(&mut self) -> Result<usize, NativeError> {
        let mut transferred = 0u32;
        // SAFETY: overlapped belongs to an operation issued on `handle`.
        let result =
            unsafe { GetOverlappedResult(self.handle, &*self.overlapped, &mut transferred, true) };
        self.reaped = true;
        match result {
            Ok(()) => Ok(transferred as usize),
            Err(e) => Err(from_error(&e)),
        }
    }
}

impl Drop for WinPending<'_> {
    fn drop(&mut self) {
        if !self.reaped {
            // SAFETY: cancelling our own operation, then waiting it out.
            unsafe {
                let _ = CancelIoEx(self.handle, Some(&*self.overlapped));
            }
            let _ = self.reap();
        }
        // SAFETY: event created in begin(), no longer referenced by the kernel.
        unsafe {
            let _ = CloseHandle(self.event());
        }
    }
}

// ── Backend ──

/// Native backend over the Win32 device stack.
#[derive(Debug, Default)]
pub struct WindowsApi;

impl WindowsApi {
    fn begin<'a>(
        &'a self,
        handle: WinHandle,
        issue: impl FnOnce(*mut OVERLAPPED) -> windows::core::Result<()>,
    ) -> Result<Begin<WinPending<'a>>, NativeError> {
        let event = new_event()?;
        let mut pending = WinPending {
            handle: handle.0,
            overlapped: Box::new(OVERLAPPED {
                hEvent: event,
                ..Default::default()
            }),
            reaped: false,
            _buf: PhantomData,
        };
        match issue(&mut *pending.overlapped) {
            Ok(()) => pending.reap().map(Begin::Completed),
            Err(e) if is_pending(&e) => Ok(Begin::Pending(pending)),
            Err(e) => {
                pending.reaped = true;
                Err(from_error(&e))
            }
        }
    }
}

impl NativeDeviceApi for WindowsApi {
    type Handle = WinHandle;
    type Signal = WinEvent;
    type Pending<'a> = WinPending<'a>;

    fn enumerate_interfaces(
        &self,
        kind: DeviceKind,
    ) -> Result<Vec<RawInterface>, NativeError> {
        let guid = interface_class(kind);
        // SAFETY: standard SetupDi enumeration; dev_info is destroyed below.
        unsafe {
            let dev_info = SetupDiGetClassDevsW(
                Some(&guid),
                PCWSTR::null(),
                None,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
            .map_err(|e| from_error(&e))?;
            let result = enumerate_in(dev_info, &guid);
            let _ = SetupDiDestroyDeviceInfoList(dev_info);
            result
        }
    }

    fn string_property(&self, instance: InstanceRef, property: DeviceProperty) -> Option<String> {
        match property {
            DeviceProperty::HardwareIds => registry_property(instance.0, CM_DRP_HARDWAREID),
            DeviceProperty::FriendlyName => registry_property(instance.0, CM_DRP_FRIENDLYNAME),
            DeviceProperty::InstanceId => instance_id(instance.0),
            DeviceProperty::PortName => port_name_value(instance.0),
        }
    }

    fn filesystem_name(&self, root: &str) -> Option<String> {
        let root = wide(root);
        let mut name = [0u16; 64];
        // SAFETY: root is NUL-terminated; name is a valid output slice.
        unsafe {
            GetVolumeInformationW(
                PCWSTR(root.as_ptr()),
                None,
                None,
                None,
                None,
                Some(&mut name),
            )
        }
        .ok()?;
        Some(from_wide(&name)).filter(|s| !s.is_empty())
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<WinHandle, NativeError> {
        let (access, share, flags) = match mode {
            OpenMode::Query => (
                GENERIC_READ.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                FILE_FLAGS_AND_ATTRIBUTES(0),
            ),
            OpenMode::Shared => (
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                FILE_FLAG_OVERLAPPED,
            ),
            OpenMode::Exclusive => (
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_MODE(0),
                FILE_FLAG_OVERLAPPED,
            ),
        };
        let path = wide(path);
        // SAFETY: path is NUL-terminated and outlives the call.
        let handle = unsafe {
            CreateFileW(
                PCWSTR(path.as_ptr()),
                access,
                share,
                None,
                OPEN_EXISTING,
                flags,
                None,
            )
        }
        .map_err(|e| from_error(&e))?;
        Ok(WinHandle(handle))
    }

    fn close_handle(&self, handle: WinHandle) {
        // SAFETY: the handle guard closes each handle exactly once.
        unsafe {
            let _ = CloseHandle(handle.0);
        }
    }

    fn hid_attributes(&self, handle: WinHandle) -> Result<HidAttributes, NativeError> {
        let mut attrs = HIDD_ATTRIBUTES {
            Size: mem::size_of::<HIDD_ATTRIBUTES>() as u32,
            ..Default::default()
        };
        // SAFETY: attrs is a correctly sized output struct.
        if !unsafe { HidD_GetAttributes(handle.0, &mut attrs) } {
            return Err(last_error());
        }
        Ok(HidAttributes {
            vendor_id: attrs.VendorID,
            product_id: attrs.ProductID,
            version: attrs.VersionNumber,
        })
    }

    fn hid_report_lengths(&self, handle: WinHandle) -> Result<ReportLengths, NativeError> {
        let caps = hid_caps(handle)?;
        Ok(ReportLengths {
            input: caps.InputReportByteLength,
            output: caps.OutputReportByteLength,
            feature: caps.FeatureReportByteLength,
        })
    }

    fn hid_usage(&self, handle: WinHandle) -> Result<HidUsage, NativeError> {
        let caps = hid_caps(handle)?;
        Ok(HidUsage {
            usage_page: caps.UsagePage,
            usage: caps.Usage,
        })
    }

    fn hid_set_input_buffers(&self, handle: WinHandle, count: u32) -> Result<(), NativeError> {
        // SAFETY: plain value call on a live handle.
        if unsafe { HidD_SetNumInputBuffers(handle.0, count) } {
            Ok(())
        } else {
            Err(last_error())
        }
    }

    fn hid_get_feature(&self, handle: WinHandle, buf: &mut [u8]) -> Result<(), NativeError> {
        // SAFETY: buf is valid for buf.len() bytes of writes.
        if unsafe { HidD_GetFeature(handle.0, buf.as_mut_ptr().cast(), buf.len() as u32) } {
            Ok(())
        } else {
            Err(last_error())
        }
    }

    fn hid_set_feature(&self, handle: WinHandle, buf: &[u8]) -> Result<(), NativeError> {
        // SAFETY: buf is valid for buf.len() bytes of reads.
        if unsafe { HidD_SetFeature(handle.0, buf.as_ptr().cast(), buf.len() as u32) } {
            Ok(())
        } else {
            Err(last_error())
        }
    }

    fn hid_string(&self, handle: WinHandle, which: HidString) -> Option<String> {
        let mut buf = [0u16; HID_STRING_UNITS];
        let ptr = buf.as_mut_ptr().cast();
        let len = mem::size_of_val(&buf) as u32;
        // SAFETY: buf is valid for len bytes of writes.
        let ok = unsafe {
            match which {
                HidString::Manufacturer => HidD_GetManufacturerString(handle.0, ptr, len),
                HidString::Product => HidD_GetProductString(handle.0, ptr, len),
                HidString::SerialNumber => HidD_GetSerialNumberString(handle.0, ptr, len),
            }
        };
        ok.then(|| from_wide(&buf))
    }

    fn apply_line_config(&self, handle: WinHandle, config: &LineConfig) -> Result<(), NativeError> {
        let mut dcb = DCB {
            DCBlength: mem::size_of::<DCB>() as u32,
            ..Default::default()
        };
        // SAFETY: dcb and timeouts are correctly sized structs.
        unsafe {
            GetCommState(handle.0, &mut dcb).map_err(|e| from_error(&e))?;
            dcb.BaudRate = config.baud_rate;
            dcb.ByteSize = config.data_bits;
            dcb.Parity = match config.parity {
                Parity::None => NOPARITY,
                Parity::Even => EVENPARITY,
                Parity::Odd => ODDPARITY,
            };
            dcb.StopBits = if config.stop_bits == 2 {
                TWOSTOPBITS
            } else {
                ONESTOPBIT
            };
            // fBinary on, fParity follows the parity setting.
            dcb._bitfield = (dcb._bitfield & !0b11)
                | 0b01
                | if config.parity == Parity::None { 0 } else { 0b10 };
            SetCommState(handle.0, &dcb).map_err(|e| from_error(&e))?;
            // All zero: reads return on data, timeouts come from the waits.
            SetCommTimeouts(handle.0, &COMMTIMEOUTS::default()).map_err(|e| from_error(&e))
        }
    }

    fn purge(&self, handle: WinHandle) -> Result<(), NativeError> {
        // SAFETY: plain flag call on a live handle.
        unsafe {
            PurgeComm(
                handle.0,
                PURGE_RXABORT | PURGE_TXABORT | PURGE_RXCLEAR | PURGE_TXCLEAR,
            )
        }
        .map_err(|e| from_error(&e))
    }

    fn create_signal(&self) -> Result<WinEvent, NativeError> {
        new_event().map(WinEvent)
    }

    fn raise_signal(&self, signal: &WinEvent) {
        // SAFETY: live event handle.
        unsafe {
            let _ = SetEvent(signal.0);
        }
    }

    fn free_signal(&self, signal: &WinEvent) {
        // SAFETY: the handle guard frees the signal exactly once.
        unsafe {
            let _ = CloseHandle(signal.0);
        }
    }

    fn begin_read<'a>(
        &'a self,
        handle: WinHandle,
        buf: &'a mut [u8],
    ) -> Result<Begin<WinPending<'a>>, NativeError> {
        self.begin(handle, |ov| {
            // SAFETY: buf and ov stay alive until the pending op is reaped.
            unsafe { ReadFile(handle.0, Some(buf), None, Some(ov)) }
        })
    }

    fn begin_write<'a>(
        &'a self,
        handle: WinHandle,
        buf: &'a [u8],
    ) -> Result<Begin<WinPending<'a>>, NativeError> {
        self.begin(handle, |ov| {
            // SAFETY: buf and ov stay alive until the pending op is reaped.
            unsafe { WriteFile(handle.0, Some(buf), None, Some(ov)) }
        })
    }

    fn wait(
        &self,
        pending: &WinPending<'_>,
        close: &WinEvent,
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        let millis = timeout.map_or(INFINITE, |t| {
            u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1)
        });
        // Operation first: the lowest signalled index wins.
        let handles = [pending.event(), close.0];
        // SAFETY: both handles are live for the duration of the wait.
        let result = unsafe { WaitForMultipleObjects(&handles, false, millis) };
        match result {
            r if r == WAIT_OBJECT_0 => WaitOutcome::Completed,
            r if r.0 == WAIT_OBJECT_0.0 + 1 => WaitOutcome::Closed,
            r if r == WAIT_TIMEOUT => WaitOutcome::TimedOut,
            r => {
                log::warn!("wait failed ({:#x}), treating as closed", r.0);
                WaitOutcome::Closed
            }
        }
    }

    fn cancel(&self, handle: WinHandle, pending: &WinPending<'_>) {
        // SAFETY: cancelling only the operation identified by this block.
        unsafe {
            let _ = CancelIoEx(handle.0, Some(&*pending.overlapped));
        }
    }

    fn get_result(
        &self,
        _handle: WinHandle,
        mut pending: WinPending<'_>,
    ) -> Result<usize, NativeError> {
        pending.reap()
    }
}

// ── HID helpers ──

/// Top-level collection capabilities of an open HID handle.
fn hid_caps(handle: WinHandle) -> Result<HIDP_CAPS, NativeError> {
    let mut preparsed = PHIDP_PREPARSED_DATA::default();
    // SAFETY: preparsed data is freed below on every path.
    unsafe {
        if !HidD_GetPreparsedData(handle.0, &mut preparsed) {
            return Err(last_error());
        }
        let mut caps = HIDP_CAPS::default();
        let status = HidP_GetCaps(preparsed, &mut caps);
        let _ = HidD_FreePreparsedData(preparsed);
        if status != HIDP_STATUS_SUCCESS {
            return Err(NativeError::Os(status.0 as u32));
        }
        Ok(caps)
    }
}

// ── SetupDi / CfgMgr helpers ──

/// Walk every interface in `dev_info`.
///
/// # Safety
/// `dev_info` must be a live device information set for `guid`.
unsafe fn enumerate_in(dev_info: HDEVINFO, guid: &GUID) -> Result<Vec<RawInterface>, NativeError> {
    super::walk_interfaces(|index| {
        let mut iface = SP_DEVICE_INTERFACE_DATA {
            cbSize: mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            ..Default::default()
        };
        // SAFETY: caller guarantees dev_info; iface is correctly sized.
        unsafe { SetupDiEnumDeviceInterfaces(dev_info, None, guid, index, &mut iface) }
            .map_err(|e| from_error(&e))?;
        // SAFETY: same set and interface as above.
        Ok(unsafe { interface_detail(dev_info, &iface) })
    })
}

/// Path and devnode for one interface. A zero required size yields an
/// empty path.
///
/// # Safety
/// `iface` must come from `dev_info`.
unsafe fn interface_detail(dev_info: HDEVINFO, iface: &SP_DEVICE_INTERFACE_DATA) -> RawInterface {
    let mut required = 0u32;
    // SAFETY: size query with no output buffer.
    let _ = unsafe {
        SetupDiGetDeviceInterfaceDetailW(dev_info, iface, None, 0, Some(&mut required), None)
    };
    if required == 0 {
        return RawInterface {
            raw_path: String::new(),
            instance: None,
        };
    }

    // u32-aligned backing storage for the variable-length detail struct.
    let mut buf = vec![0u32; (required as usize).div_ceil(4)];
    let detail = buf.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
    let mut devinfo = SP_DEVINFO_DATA {
        cbSize: mem::size_of::<SP_DEVINFO_DATA>() as u32,
        ..Default::default()
    };
    // SAFETY: buf holds `required` bytes; cbSize is the fixed header size.
    let ok = unsafe {
        (*detail).cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
        SetupDiGetDeviceInterfaceDetailW(
            dev_info,
            iface,
            Some(detail),
            required,
            None,
            Some(&mut devinfo),
        )
        .is_ok()
    };
    if !ok {
        return RawInterface {
            raw_path: String::new(),
            instance: None,
        };
    }
    // SAFETY: DevicePath is a NUL-terminated string inside buf.
    let raw_path = unsafe {
        let path_ptr = std::ptr::addr_of!((*detail).DevicePath) as *const u16;
        let max = (required as usize - mem::offset_of!(SP_DEVICE_INTERFACE_DETAIL_DATA_W, DevicePath))
            / 2;
        from_wide(std::slice::from_raw_parts(path_ptr, max))
    };
    RawInterface {
        raw_path,
        instance: Some(InstanceRef(devinfo.DevInst)),
    }
}

/// Registry property of a devnode, growing the buffer once if needed.
fn registry_property(devnode: u32, property: u32) -> Option<String> {
    let mut len = 0u32;
    // SAFETY: size query with no buffer.
    let cr = unsafe {
        CM_Get_DevNode_Registry_PropertyW(devnode, property, None, None, &mut len, 0)
    };
    if cr != CR_BUFFER_SMALL || len == 0 {
        return None;
    }
    let mut buf = vec![0u8; len as usize];
    // SAFETY: buf holds len bytes.
    let cr = unsafe {
        CM_Get_DevNode_Registry_PropertyW(
            devnode,
            property,
            None,
            Some(buf.as_mut_ptr().cast()),
            &mut len,
            0,
        )
    };
    (cr == CR_SUCCESS).then(|| from_wide_bytes(&buf[..len as usize]))
}

fn instance_id(devnode: u32) -> Option<String> {
    let mut len = 0u32;
    // SAFETY: plain size query.
    if unsafe { CM_Get_Device_ID_Size(&mut len, devnode, 0) } != CR_SUCCESS {
        return None;
    }
    let mut buf = vec![0u16; len as usize + 1];
    // SAFETY: buf holds len + 1 units.
    (unsafe { CM_Get_Device_IDW(devnode, &mut buf, 0) } == CR_SUCCESS).then(|| from_wide(&buf))
}

/// `PortName` under the devnode's hardware key.
fn port_name_value(devnode: u32) -> Option<String> {
    let mut key = HKEY::default();
    // SAFETY: key is closed below.
    let cr = unsafe {
        CM_Open_DevNode_Key(
            devnode,
            KEY_READ.0,
            0,
            RegDisposition_OpenExisting,
            &mut key,
            CM_REGISTRY_HARDWARE,
        )
    };
    if cr != CR_SUCCESS {
        return None;
    }
    let name = wide("PortName");
    let mut value = [0u8; 64];
    let mut len = value.len() as u32;
    // SAFETY: value holds len bytes; name is NUL-terminated.
    let status = unsafe {
        let status = RegQueryValueExW(
            key,
            PCWSTR(name.as_ptr()),
            None,
            None,
            Some(value.as_mut_ptr()),
            Some(&mut len),
        );
        let _ = RegCloseKey(key);
        status
    };
    (status == ERROR_SUCCESS).then(|| from_wide_bytes(&value[..len as usize]))
}
