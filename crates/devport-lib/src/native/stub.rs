//! Backend for hosts without the native device stack.
//!
//! Enumeration finds nothing and every open fails with
//! [`NativeError::Unsupported`], so no handle or pending operation can
//! ever exist.

use std::convert::Infallible;
use std::time::Duration;

use super::*;

#[derive(Debug, Default)]
pub struct UnsupportedApi;

/// Uninhabited: no operation can be in flight without a handle.
pub enum NoPending {}

impl NativeDeviceApi for UnsupportedApi {
    type Handle = Infallible;
    type Signal = ();
    type Pending<'a> = NoPending;

    fn enumerate_interfaces(&self, kind: DeviceKind) -> Result<Vec<RawInterface>, NativeError> {
        log::debug!("{kind} enumeration unavailable on this platform");
        Ok(Vec::new())
    }

    fn string_property(&self, _: InstanceRef, _: DeviceProperty) -> Option<String> {
        None
    }

    fn filesystem_name(&self, _: &str) -> Option<String> {
        None
    }

    fn open(&self, _: &str, _: OpenMode) -> Result<Infallible, NativeError> {
        Err(NativeError::Unsupported)
    }

    fn close_handle(&self, handle: Infallible) {
        match handle {}
    }

    fn hid_attributes(&self, handle: Infallible) -> Result<HidAttributes, NativeError> {
        match handle {}
    }

    fn hid_report_lengths(&self, handle: Infallible) -> Result<ReportLengths, NativeError> {
        match handle {}
    }

    fn hid_usage(&self, handle: Infallible) -> Result<HidUsage, NativeError> {
        match handle {}
    }

    fn hid_set_input_buffers(&self, handle: Infallible, _: u32) -> Result<(), NativeError> {
        match handle {}
    }

    fn hid_get_feature(&self, handle: Infallible, _: &mut [u8]) -> Result<(), NativeError> {
        match handle {}
    }

    fn hid_set_feature(&self, handle: Infallible, _: &[u8]) -> Result<(), NativeError> {
        match handle {}
    }

    fn hid_string(&self, handle: Infallible, _: HidString) -> Option<String> {
        match handle {}
    }

    fn apply_line_config(&self, handle: Infallible, _: &LineConfig) -> Result<(), NativeError> {
        match handle {}
    }

    fn purge(&self, handle: Infallible) -> Result<(), NativeError> {
        match handle {}
    }

    fn create_signal(&self) -> Result<(), NativeError> {
        Ok(())
    }

    fn raise_signal(&self, _: &()) {}

    fn free_signal(&self, _: &()) {}

    fn begin_read<'a>(
        &'a self,
        handle: Infallible,
        _: &'a mut [u8],
    ) -> Result<Begin<NoPending>, NativeError> {
        match handle {}
    }

    fn begin_write<'a>(
        &'a self,
        handle: Infallible,
        _: &'a [u8],
    ) -> Result<Begin<NoPending>, NativeError> {
        match handle {}
    }

    fn wait(&self, pending: &NoPending, _: &(), _: Option<Duration>) -> WaitOutcome {
        match *pending {}
    }

    fn cancel(&self, handle: Infallible, _: &NoPending) {
        match handle {}
    }

    fn get_result(&self, handle: Infallible, _: NoPending) -> Result<usize, NativeError> {
        match handle {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_is_empty() {
        let api = UnsupportedApi;
        for kind in DeviceKind::ALL {
            assert!(api.enumerate_interfaces(kind).unwrap().is_empty());
        }
    }

    #[test]
    fn open_is_unsupported() {
        let api = UnsupportedApi;
        assert_eq!(
            api.open(r"\\?\hid#x", OpenMode::Shared).unwrap_err(),
            NativeError::Unsupported
        );
    }
}
