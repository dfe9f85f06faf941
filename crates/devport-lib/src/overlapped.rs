//! One overlapped read or write, raced against completion, close and timeout.
//!
//! ```text
//! begin ──► Completed(n) ───────────────────────────────► Ok(n)
//!   │
//!   └─► Pending ─► wait ─┬─ Completed ─► get_result ─────► Ok(n)
//!                        ├─ Closed ────► cancel, reap ───► Disposed
//!                        └─ TimedOut ──► cancel, reap ───► TimedOut
//! ```
//!
//! Every pending operation is reaped with `get_result` before returning,
//! so the caller's buffer is never left in the hands of the OS.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::device::{DeviceError, Result};
use crate::handle::Lease;
use crate::native::{Begin, NativeDeviceApi, NativeError, WaitOutcome};

/// Default read and write timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 2000;

/// Convert a millisecond timeout to a wait bound; negative means no bound.
pub fn timeout_from_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}

/// Per-session read and write timeouts, adjustable while I/O is in flight.
///
/// A change applies to operations issued after it.
#[derive(Debug)]
pub struct IoTimeouts {
    read_ms: AtomicI64,
    write_ms: AtomicI64,
}

impl Default for IoTimeouts {
    fn default() -> Self {
        IoTimeouts::new(DEFAULT_TIMEOUT_MS, DEFAULT_TIMEOUT_MS)
    }
}

impl IoTimeouts {
    pub fn new(read_ms: i64, write_ms: i64) -> Self {
        IoTimeouts {
            read_ms: AtomicI64::new(read_ms),
            write_ms: AtomicI64::new(write_ms),
        }
    }

    pub fn read_ms(&self) -> i64 {
        self.read_ms.load(Ordering::Relaxed)
    }

    pub fn write_ms(&self) -> i64 {
        self.write_ms.load(Ordering::Relaxed)
    }

    pub fn set_read_ms(&self, ms: i64) {
        self.read_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_write_ms(&self, ms: i64) {
        self.write_ms.store(ms, Ordering::Relaxed);
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        timeout_from_millis(self.read_ms())
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        timeout_from_millis(self.write_ms())
    }
}

/// Read into `buf` through the leased handle.
pub fn read<A: NativeDeviceApi>(
    lease: &Lease<'_, A>,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize> {
    let api = lease.api();
    let begun = api.begin_read(lease.handle(), buf);
    drive(api, lease, begun, timeout, "read")
}

/// Write `buf` through the leased handle. Returns the bytes transferred,
/// which may be fewer than `buf.len()`.
pub fn write<A: NativeDeviceApi>(
    lease: &Lease<'_, A>,
    buf: &[u8],
    timeout: Option<Duration>,
) -> Result<usize> {
    let api = lease.api();
    let begun = api.begin_write(lease.handle(), buf);
    drive(api, lease, begun, timeout, "write")
}

fn drive<'a, A: NativeDeviceApi>(
    api: &'a A,
    lease: &Lease<'_, A>,
    begun: std::result::Result<Begin<A::Pending<'a>>, NativeError>,
    timeout: Option<Duration>,
    context: &'static str,
) -> Result<usize> {
    let handle = lease.handle();
    let pending = match begun {
        Ok(Begin::Completed(n)) => return Ok(n),
        Ok(Begin::Pending(pending)) => pending,
        Err(e) => return transferred(Err(e), context),
    };

    match api.wait(&pending, lease.close_signal(), timeout) {
        WaitOutcome::Completed => transferred(api.get_result(handle, pending), context),
        WaitOutcome::Closed => {
            api.cancel(handle, &pending);
            let reaped = api.get_result(handle, pending);
            log::debug!("{context} on {handle:?} cancelled by close ({reaped:?})");
            Err(DeviceError::Disposed)
        }
        WaitOutcome::TimedOut => {
            api.cancel(handle, &pending);
            let reaped = api.get_result(handle, pending);
            log::debug!("{context} on {handle:?} timed out after {timeout:?} ({reaped:?})");
            Err(DeviceError::TimedOut)
        }
    }
}

/// Map a native byte count, treating end-of-data as zero bytes.
fn transferred(
    result: std::result::Result<usize, NativeError>,
    context: &'static str,
) -> Result<usize> {
    match result {
        Ok(n) => Ok(n),
        Err(NativeError::EndOfData) => Ok(0),
        Err(e) => Err(DeviceError::io(context, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleGuard;
    use crate::native::OpenMode;
    use crate::native::mock::{MockApi, MockDevice, MockIo};
    use std::sync::Arc;

    const PATH: &str = r"\\?\mock#overlapped";
    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    fn guard() -> (Arc<MockApi>, HandleGuard<MockApi>) {
        let api = Arc::new(MockApi::new());
        api.add_device(PATH, MockDevice::default());
        let guard = HandleGuard::open(api.clone(), |a| a.open(PATH, OpenMode::Shared)).unwrap();
        (api, guard)
    }

    // ── timeouts ──

    #[test]
    fn negative_timeout_is_infinite() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), Some(Duration::ZERO));
        assert_eq!(timeout_from_millis(2000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn io_timeouts_default_and_update() {
        let t = IoTimeouts::default();
        assert_eq!(t.read_ms(), 2000);
        assert_eq!(t.write_ms(), 2000);
        t.set_read_ms(-5);
        assert_eq!(t.read_timeout(), None);
        assert_eq!(t.write_timeout(), Some(Duration::from_secs(2)));
    }

    // ── read ──

    #[test]
    fn synchronous_completion_returns_count() {
        let (api, guard) = guard();
        api.push_read(PATH, MockIo::data(b"abc"));
        let lease = guard.acquire_or_fail().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(read(&lease, &mut buf, SHORT).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn pending_completion_is_reaped() {
        let (api, guard) = guard();
        api.push_read(PATH, MockIo::data_after(Duration::from_millis(5), b"xy"));
        let lease = guard.acquire_or_fail().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read(&lease, &mut buf, None).unwrap(), 2);
        assert_eq!(&buf[..2], b"xy");
        assert_eq!(api.pending_count(), 0);
        assert_eq!(api.cancel_count(), 0);
    }

    #[test]
    fn timeout_cancels_and_reaps() {
        let (api, guard) = guard();
        let lease = guard.acquire_or_fail().unwrap();
        let mut buf = [0u8; 4];
        let err = read(&lease, &mut buf, SHORT).unwrap_err();
        assert!(matches!(err, DeviceError::TimedOut), "{err}");
        assert_eq!(api.cancel_count(), 1);
        assert_eq!(api.pending_count(), 0);
    }

    #[test]
    fn close_signal_ends_wait_with_disposed() {
        let (api, guard) = guard();
        let lease = guard.acquire_or_fail().unwrap();
        guard.request_close();
        let mut buf = [0u8; 4];
        let err = read(&lease, &mut buf, None).unwrap_err();
        assert!(matches!(err, DeviceError::Disposed), "{err}");
        assert_eq!(api.cancel_count(), 1);
        drop(lease);
        assert_eq!(api.handle_frees(), 1);
    }

    #[test]
    fn end_of_data_is_zero_bytes() {
        let (api, guard) = guard();
        api.push_read(PATH, MockIo::error(NativeError::EndOfData));
        api.push_read(
            PATH,
            MockIo::error_after(Duration::ZERO, NativeError::EndOfData),
        );
        let lease = guard.acquire_or_fail().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read(&lease, &mut buf, SHORT).unwrap(), 0);
        assert_eq!(read(&lease, &mut buf, SHORT).unwrap(), 0);
    }

    #[test]
    fn native_failure_is_io_failure() {
        let (api, guard) = guard();
        api.push_read(PATH, MockIo::error_after(Duration::ZERO, NativeError::Os(1167)));
        let lease = guard.acquire_or_fail().unwrap();
        let mut buf = [0u8; 4];
        match read(&lease, &mut buf, SHORT).unwrap_err() {
            DeviceError::IoFailure { context, source } => {
                assert_eq!(context, "read");
                assert_eq!(source, NativeError::Os(1167));
            }
            other => panic!("unexpected {other}"),
        }
    }

    // ── write ──

    #[test]
    fn write_reports_partial_transfer() {
        let (api, guard) = guard();
        api.push_write(PATH, MockIo::transferred(3));
        let lease = guard.acquire_or_fail().unwrap();
        assert_eq!(write(&lease, b"hello", SHORT).unwrap(), 3);
        assert_eq!(api.written(PATH), vec![b"hello".to_vec()]);
    }

    #[test]
    fn write_failure_names_write_context() {
        let (api, guard) = guard();
        api.push_write(PATH, MockIo::error(NativeError::Os(5)));
        let lease = guard.acquire_or_fail().unwrap();
        let err = write(&lease, b"x", SHORT).unwrap_err();
        assert_eq!(err.to_string(), "I/O failed: write: os error 5");
    }
}
