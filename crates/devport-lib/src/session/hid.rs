//! HID session: fixed-length input and output reports, feature reports and
//! device strings.
//!
//! Report lengths come from the device's capabilities and are cached for the
//! lifetime of the session. Writes are framed as whole output reports:
//! a short buffer is zero-padded, a long one is split into consecutive
//! reports, and every report must transfer in full.

use std::sync::{Arc, Mutex, OnceLock};

use super::{DeviceIo, SessionOptions};
use crate::device::{DeviceError, Result};
use crate::handle::{HandleGuard, Lease};
use crate::native::{HidString, NativeDeviceApi, OpenMode, ReportLengths};
use crate::overlapped::{self, IoTimeouts};

pub struct HidSession<A: NativeDeviceApi> {
    guard: HandleGuard<A>,
    path: String,
    timeouts: IoTimeouts,
    lengths: OnceLock<ReportLengths>,
    /// Reused input buffer; a concurrent read that finds it taken allocates.
    scratch: Mutex<Vec<u8>>,
}

impl<A: NativeDeviceApi> HidSession<A> {
    /// Open `path` for shared overlapped I/O and size the driver's input ring.
    pub fn open(api: Arc<A>, path: &str, options: &SessionOptions) -> Result<Self> {
        let guard = HandleGuard::open(api, |a| a.open(path, OpenMode::Shared))?;
        let session = HidSession {
            guard,
            path: path.to_string(),
            timeouts: options.timeouts(),
            lengths: OnceLock::new(),
            scratch: Mutex::new(Vec::new()),
        };

        {
            let lease = session.guard.acquire_or_fail()?;
            lease
                .api()
                .hid_set_input_buffers(lease.handle(), options.hid_input_buffers)
                .map_err(|e| DeviceError::io("set input buffers", e))?;
        }
        if options.eager_report_lengths {
            session.report_lengths()?;
        }
        log::debug!("HID session opened on {path}");
        Ok(session)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Input, output and feature report lengths, queried once per session.
    pub fn report_lengths(&self) -> Result<ReportLengths> {
        let lease = self.guard.acquire_or_fail()?;
        self.lengths(&lease)
    }

    fn lengths(&self, lease: &Lease<'_, A>) -> Result<ReportLengths> {
        if let Some(lengths) = self.lengths.get() {
            return Ok(*lengths);
        }
        let queried = lease
            .api()
            .hid_report_lengths(lease.handle())
            .map_err(|e| DeviceError::io("get report lengths", e))?;
        log::debug!(
            "{}: input {} output {} feature {}",
            self.path,
            queried.input,
            queried.output,
            queried.feature
        );
        Ok(*self.lengths.get_or_init(|| queried))
    }

    fn take_scratch(&self, len: usize) -> Vec<u8> {
        let mut buf = self
            .scratch
            .try_lock()
            .map(|mut cached| std::mem::take(&mut *cached))
            .unwrap_or_default();
        if buf.len() < len {
            buf.resize(len, 0);
        }
        buf
    }

    fn return_scratch(&self, buf: Vec<u8>) {
        if let Ok(mut cached) = self.scratch.try_lock() {
            if cached.len() < buf.len() {
                *cached = buf;
            }
        }
    }

    /// Read a feature report. `buf[0]` selects the report id; the report is
    /// copied back into `buf`, truncated to fit. Returns the bytes copied.
    pub fn get_feature(&self, buf: &mut [u8]) -> Result<usize> {
        let lease = self.guard.acquire_or_fail()?;
        let feature = self.feature_length(&lease)?;
        let Some(&report_id) = buf.first() else {
            return Err(DeviceError::InvalidArgument(
                "get_feature: buffer must hold the report id".into(),
            ));
        };
        let mut report = vec![0u8; feature];
        report[0] = report_id;
        lease
            .api()
            .hid_get_feature(lease.handle(), &mut report)
            .map_err(|e| DeviceError::io("get feature", e))?;
        let n = buf.len().min(feature);
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }

    /// Send a feature report (`buf[0]` is the report id), zero-padded to the
    /// feature report length.
    pub fn set_feature(&self, buf: &[u8]) -> Result<()> {
        let lease = self.guard.acquire_or_fail()?;
        let feature = self.feature_length(&lease)?;
        if buf.is_empty() || buf.len() > feature {
            return Err(DeviceError::InvalidArgument(format!(
                "set_feature: report of {} bytes, device expects 1..={feature}",
                buf.len()
            )));
        }
        let mut report = vec![0u8; feature];
        report[..buf.len()].copy_from_slice(buf);
        lease
            .api()
            .hid_set_feature(lease.handle(), &report)
            .map_err(|e| DeviceError::io("set feature", e))
    }

    fn feature_length(&self, lease: &Lease<'_, A>) -> Result<usize> {
        match usize::from(self.lengths(lease)?.feature) {
            0 => Err(DeviceError::NotSupported(
                "feature report: device has no feature reports".into(),
            )),
            n => Ok(n),
        }
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.string(HidString::Manufacturer)
    }

    pub fn product(&self) -> Option<String> {
        self.string(HidString::Product)
    }

    pub fn serial_number(&self) -> Option<String> {
        self.string(HidString::SerialNumber)
    }

    fn string(&self, which: HidString) -> Option<String> {
        let lease = self.guard.acquire_or_fail().ok()?;
        lease
            .api()
            .hid_string(lease.handle(), which)
            .filter(|s| !s.is_empty())
    }
}

impl<A: NativeDeviceApi> DeviceIo for HidSession<A> {
    /// Read one input report and copy up to `buf.len()` bytes of it.
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let lease = self.guard.acquire_or_fail()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let input = usize::from(self.lengths(&lease)?.input);
        if input == 0 {
            return Err(DeviceError::NotSupported(
                "read: device has no input reports".into(),
            ));
        }

        let len = buf.len().max(input);
        let mut scratch = self.take_scratch(len);
        let result = overlapped::read(&lease, &mut scratch[..len], self.timeouts.read_timeout())
            .map(|n| {
                let copied = n.min(buf.len());
                buf[..copied].copy_from_slice(&scratch[..copied]);
                copied
            });
        self.return_scratch(scratch);
        result
    }

    /// Send `buf` as `ceil(len / output_len)` output reports (one report for
    /// an empty buffer), each zero-padded to the output report length.
    fn write(&self, buf: &[u8]) -> Result<()> {
        let lease = self.guard.acquire_or_fail()?;
        let output = usize::from(self.lengths(&lease)?.output);
        if output == 0 {
            return Err(DeviceError::NotSupported(
                "write: device has no output reports".into(),
            ));
        }

        let timeout = self.timeouts.write_timeout();
        let mut report = vec![0u8; output];
        let mut send = |chunk: &[u8]| -> Result<()> {
            report.fill(0);
            report[..chunk.len()].copy_from_slice(chunk);
            let n = overlapped::write(&lease, &report, timeout)?;
            if n != output {
                return Err(DeviceError::ShortWrite {
                    expected: output,
                    transferred: n,
                });
            }
            Ok(())
        };

        if buf.is_empty() {
            return send(buf);
        }
        buf.chunks(output).try_for_each(&mut send)
    }

    fn close(&self) -> bool {
        self.guard.request_close()
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    fn timeouts(&self) -> &IoTimeouts {
        &self.timeouts
    }
}
