//! Raw byte-stream session over a generic USB device interface.

use std::sync::Arc;

use super::{DeviceIo, SessionOptions};
use crate::device::{DeviceError, Result};
use crate::handle::HandleGuard;
use crate::native::{NativeDeviceApi, OpenMode};
use crate::overlapped::{self, IoTimeouts};

pub struct UsbSession<A: NativeDeviceApi> {
    guard: HandleGuard<A>,
    path: String,
    timeouts: IoTimeouts,
}

impl<A: NativeDeviceApi> UsbSession<A> {
    /// Open `path` for shared overlapped read/write.
    pub fn open(api: Arc<A>, path: &str, options: &SessionOptions) -> Result<Self> {
        let guard = HandleGuard::open(api, |a| a.open(path, OpenMode::Shared))?;
        Ok(UsbSession {
            guard,
            path: path.to_string(),
            timeouts: options.timeouts(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<A: NativeDeviceApi> DeviceIo for UsbSession<A> {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let lease = self.guard.acquire_or_fail()?;
        if buf.is_empty() {
            return Ok(0);
        }
        overlapped::read(&lease, buf, self.timeouts.read_timeout())
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        let lease = self.guard.acquire_or_fail()?;
        if buf.is_empty() {
            return Ok(());
        }
        let n = overlapped::write(&lease, buf, self.timeouts.write_timeout())?;
        if n < buf.len() {
            return Err(DeviceError::ShortWrite {
                expected: buf.len(),
                transferred: n,
            });
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::{MockApi, MockDevice, MockIo};

    const PATH: &str = r"\\?\usb#vid_0403&pid_6001#a1#{a5dcbf10-6530-11d2-901f-00c04fb951ed}";

    fn session() -> (Arc<MockApi>, UsbSession<MockApi>) {
        let api = Arc::new(MockApi::new());
        api.add_device(PATH, MockDevice::default());
        let s = UsbSession::open(api.clone(), PATH, &SessionOptions::default()).unwrap();
        (api, s)
    }

    #[test]
    fn read_returns_transferred_bytes() {
        let (api, s) = session();
        api.push_read(PATH, MockIo::data(&[1, 2, 3, 4, 5]));
        let mut buf = [0u8; 3];
        assert_eq!(s.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn short_write_is_an_error() {
        let (api, s) = session();
        api.push_write(PATH, MockIo::transferred(2));
        match s.write(b"abcd").unwrap_err() {
            DeviceError::ShortWrite {
                expected,
                transferred,
            } => {
                assert_eq!(expected, 4);
                assert_eq!(transferred, 2);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn empty_io_makes_no_native_call() {
        let (api, s) = session();
        assert_eq!(s.read(&mut []).unwrap(), 0);
        s.write(&[]).unwrap();
        assert!(api.written(PATH).is_empty());
    }

    #[test]
    fn io_after_close_is_disposed() {
        let (_api, s) = session();
        s.close();
        assert!(matches!(s.write(b"x"), Err(DeviceError::Disposed)));
        assert!(matches!(s.read(&mut [0u8; 1]), Err(DeviceError::Disposed)));
    }

    #[test]
    fn open_failure_is_handle_invalid() {
        let api = Arc::new(MockApi::new());
        let err = UsbSession::open(api, PATH, &SessionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::HandleInvalid(_)));
    }

    #[test]
    fn write_timeout_is_honoured() {
        let (api, s) = session();
        api.push_write(PATH, MockIo::never());
        s.timeouts().set_write_ms(10);
        assert!(matches!(s.write(b"x"), Err(DeviceError::TimedOut)));
        assert_eq!(api.cancel_count(), 1);
    }
}
