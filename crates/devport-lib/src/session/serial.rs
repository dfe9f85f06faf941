//! Serial port session with lazily applied line settings.
//!
//! Setters validate immediately and only mark the settings dirty. The next
//! read or write applies them and purges both driver buffers, under a lock
//! so concurrent I/O never sees a half-applied configuration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DeviceIo, SessionOptions};
use crate::device::{DeviceError, Result};
use crate::handle::{HandleGuard, Lease};
use crate::native::{LineConfig, NativeDeviceApi, OpenMode, Parity};
use crate::overlapped::{self, IoTimeouts};

#[derive(Debug)]
struct LineState {
    config: LineConfig,
    dirty: bool,
}

pub struct SerialSession<A: NativeDeviceApi> {
    guard: HandleGuard<A>,
    path: String,
    timeouts: IoTimeouts,
    line: Mutex<LineState>,
}

impl<A: NativeDeviceApi> SerialSession<A> {
    /// Open `path` exclusively. The initial line settings are validated here
    /// and applied on first I/O.
    pub fn open(api: Arc<A>, path: &str, options: &SessionOptions) -> Result<Self> {
        options
            .line
            .validate()
            .map_err(|e| DeviceError::InvalidArgument(format!("open: {e}")))?;
        let guard = HandleGuard::open(api, |a| a.open(path, OpenMode::Exclusive))?;
        log::debug!("serial session opened on {path} ({})", options.line);
        Ok(SerialSession {
            guard,
            path: path.to_string(),
            timeouts: options.timeouts(),
            line: Mutex::new(LineState {
                config: options.line,
                dirty: true,
            }),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn line(&self) -> MutexGuard<'_, LineState> {
        self.line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current settings, applied or not.
    pub fn line_config(&self) -> LineConfig {
        self.line().config
    }

    /// Whether settings changed since they were last applied.
    pub fn is_dirty(&self) -> bool {
        self.line().dirty
    }

    /// Replace all settings at once.
    pub fn set_line_config(&self, config: LineConfig) -> Result<()> {
        self.update("set_line_config", |c| *c = config)
    }

    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.update("set_baud_rate", |c| c.baud_rate = baud_rate)
    }

    pub fn set_data_bits(&self, data_bits: u8) -> Result<()> {
        self.update("set_data_bits", |c| c.data_bits = data_bits)
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        self.update("set_parity", |c| c.parity = parity)
    }

    pub fn set_stop_bits(&self, stop_bits: u8) -> Result<()> {
        self.update("set_stop_bits", |c| c.stop_bits = stop_bits)
    }

    fn update(&self, context: &str, change: impl FnOnce(&mut LineConfig)) -> Result<()> {
        let mut state = self.line();
        let mut candidate = state.config;
        change(&mut candidate);
        candidate
            .validate()
            .map_err(|e| DeviceError::InvalidArgument(format!("{context}: {e}")))?;
        if candidate != state.config {
            state.config = candidate;
            state.dirty = true;
        }
        Ok(())
    }

    /// Apply dirty settings and purge, once, before I/O proceeds.
    fn prepare(&self, lease: &Lease<'_, A>) -> Result<()> {
        let mut state = self.line();
        if !state.dirty {
            return Ok(());
        }
        let api = lease.api();
        api.apply_line_config(lease.handle(), &state.config)
            .map_err(|e| DeviceError::io("apply line config", e))?;
        api.purge(lease.handle())
            .map_err(|e| DeviceError::io("purge", e))?;
        state.dirty = false;
        log::debug!("{}: line settings {} applied", self.path, state.config);
        Ok(())
    }
}

impl<A: NativeDeviceApi> DeviceIo for SerialSession<A> {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let lease = self.guard.acquire_or_fail()?;
        self.prepare(&lease)?;
        if buf.is_empty() {
            return Ok(0);
        }
        overlapped::read(&lease, buf, self.timeouts.read_timeout())
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        let lease = self.guard.acquire_or_fail()?;
        self.prepare(&lease)?;
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
    use crate::native::NativeError;
    use crate::native::mock::{MockApi, MockDevice, MockIo};

    const PATH: &str = r"\\?\ftdibus#vid_0403+pid_6001+a1#0000#{86e0d1e0-8089-11d0-9ce4-08003e301f73}";

    fn open_with(device: MockDevice) -> (Arc<MockApi>, SerialSession<MockApi>) {
        let api = Arc::new(MockApi::new());
        api.add_device(PATH, device);
        let s = SerialSession::open(api.clone(), PATH, &SessionOptions::default()).unwrap();
        (api, s)
    }

    fn open() -> (Arc<MockApi>, SerialSession<MockApi>) {
        open_with(MockDevice::default())
    }

    #[test]
    fn defaults_are_9600_8n1_and_deferred() {
        let (api, s) = open();
        assert_eq!(s.line_config(), LineConfig::default());
        assert!(s.is_dirty());
        assert!(api.line_configs(PATH).is_empty());
        assert_eq!(api.opens()[0].1, OpenMode::Exclusive);
    }

    #[test]
    fn first_io_applies_and_purges_once() {
        let (api, s) = open();
        s.write(b"AT\r").unwrap();
        s.write(b"AT\r").unwrap();
        assert_eq!(api.line_configs(PATH), vec![LineConfig::default()]);
        assert_eq!(api.purge_count(PATH), 1);
        assert!(!s.is_dirty());
    }

    #[test]
    fn change_is_applied_before_next_io() {
        let (api, s) = open();
        api.push_read(PATH, MockIo::data(b"OK"));
        api.push_read(PATH, MockIo::data(b"OK"));
        s.read(&mut [0u8; 2]).unwrap();
        s.set_baud_rate(115_200).unwrap();
        s.set_parity(Parity::Even).unwrap();
        assert!(s.is_dirty());
        s.read(&mut [0u8; 2]).unwrap();

        let applied = api.line_configs(PATH);
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].baud_rate, 115_200);
        assert_eq!(applied[1].parity, Parity::Even);
        assert_eq!(api.purge_count(PATH), 2);
    }

    #[test]
    fn unchanged_value_keeps_clean_state() {
        let (_api, s) = open();
        s.write(b"x").unwrap();
        s.set_baud_rate(9600).unwrap();
        assert!(!s.is_dirty());
    }

    #[test]
    fn setters_reject_invalid_values_immediately() {
        let (api, s) = open();
        s.write(b"x").unwrap();
        assert!(matches!(
            s.set_data_bits(9),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(matches!(
            s.set_stop_bits(0),
            Err(DeviceError::InvalidArgument(_))
        ));
        let err = s.set_baud_rate(0).unwrap_err();
        assert!(err.to_string().contains("set_baud_rate"), "{err}");
        assert_eq!(s.line_config(), LineConfig::default());
        assert!(!s.is_dirty());
        assert_eq!(api.line_configs(PATH).len(), 1);
    }

    #[test]
    fn open_rejects_invalid_initial_settings() {
        let api = Arc::new(MockApi::new());
        api.add_device(PATH, MockDevice::default());
        let opts = SessionOptions {
            line: LineConfig {
                data_bits: 5,
                ..LineConfig::default()
            },
            ..SessionOptions::default()
        };
        assert!(matches!(
            SerialSession::open(api.clone(), PATH, &opts),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(api.opens().is_empty());
    }

    #[test]
    fn apply_failure_keeps_settings_dirty() {
        let mut device = MockDevice::default();
        device.line_config_error = Some(NativeError::Os(87));
        let (api, s) = open_with(device);
        let err = s.write(b"x").unwrap_err();
        assert!(err.to_string().contains("apply line config"), "{err}");
        assert!(s.is_dirty());
        assert!(api.written(PATH).is_empty());
    }

    #[test]
    fn purge_failure_fails_the_io() {
        let mut device = MockDevice::default();
        device.purge_error = Some(NativeError::Os(31));
        let (_api, s) = open_with(device);
        assert!(matches!(
            s.read(&mut [0u8; 1]),
            Err(DeviceError::IoFailure {
                context: "purge",
                ..
            })
        ));
        assert!(s.is_dirty());
    }

    #[test]
    fn set_line_config_replaces_all_fields() {
        let (_api, s) = open();
        let config = LineConfig {
            baud_rate: 57_600,
            data_bits: 7,
            parity: Parity::Odd,
            stop_bits: 2,
        };
        s.set_line_config(config).unwrap();
        assert_eq!(s.line_config().to_string(), "57600 7O2");
    }

    #[test]
    fn read_times_out() {
        let (api, s) = open();
        s.timeouts().set_read_ms(10);
        assert!(matches!(
            s.read(&mut [0u8; 4]),
            Err(DeviceError::TimedOut)
        ));
        assert_eq!(api.cancel_count(), 1);
    }
}
