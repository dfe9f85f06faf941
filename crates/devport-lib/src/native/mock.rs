//! In-memory native backend for unit and integration tests.
//!
//! Always compiled, hidden from public docs. Devices are keyed by path;
//! reads and writes follow per-path scripts of [`MockIo`] steps, and every
//! side effect (opens, frees, writes, purges, line configs) is recorded so
//! tests can assert on it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::*;

/// Error code the mock reports for a path with no registered device.
pub const FILE_NOT_FOUND: u32 = 2;
/// Error code the mock reports for I/O on a closed handle.
pub const INVALID_HANDLE: u32 = 6;

// ── Scripting types ──

/// When a scripted operation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Finishes inside `begin_*`; no pending token is produced.
    Sync,
    /// Goes pending and becomes ready after this delay.
    After(Duration),
    /// Goes pending and only ends through cancellation.
    Never,
}

/// What a scripted operation produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Read: copy these bytes into the caller's buffer (truncated to fit).
    Data(Vec<u8>),
    /// Write: report this many bytes transferred (capped at the buffer size).
    Transferred(usize),
    /// Write: report the whole buffer transferred.
    Full,
    Error(NativeError),
}

/// One scripted read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockIo {
    pub completion: Completion,
    pub outcome: Outcome,
}

impl MockIo {
    pub fn data(bytes: &[u8]) -> Self {
        MockIo {
            completion: Completion::Sync,
            outcome: Outcome::Data(bytes.to_vec()),
        }
    }

    pub fn data_after(delay: Duration, bytes: &[u8]) -> Self {
        MockIo {
            completion: Completion::After(delay),
            outcome: Outcome::Data(bytes.to_vec()),
        }
    }

    pub fn transferred(n: usize) -> Self {
        MockIo {
            completion: Completion::Sync,
            outcome: Outcome::Transferred(n),
        }
    }

    pub fn error(e: NativeError) -> Self {
        MockIo {
            completion: Completion::Sync,
            outcome: Outcome::Error(e),
        }
    }

    /// Pending, then ready after `delay` with an error.
    pub fn error_after(delay: Duration, e: NativeError) -> Self {
        MockIo {
            completion: Completion::After(delay),
            outcome: Outcome::Error(e),
        }
    }

    /// Pending forever; only a cancel ends it.
    pub fn never() -> Self {
        MockIo {
            completion: Completion::Never,
            outcome: Outcome::Error(NativeError::Aborted),
        }
    }
}

/// Static description of one mock device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// `None` makes the attribute query fail.
    pub attributes: Option<HidAttributes>,
    pub report_lengths: ReportLengths,
    pub usage: HidUsage,
    /// If set, the capability query fails with this error.
    pub caps_error: Option<NativeError>,
    /// If set, every open of this path fails with this error.
    pub open_error: Option<NativeError>,
    /// Returned by feature-report reads (truncated to the caller's buffer).
    pub feature_report: Vec<u8>,
    pub strings: HashMap<HidString, String>,
    pub input_buffers_error: Option<NativeError>,
    pub line_config_error: Option<NativeError>,
    pub purge_error: Option<NativeError>,
}

impl MockDevice {
    /// A HID device with the given identity and report sizes.
    pub fn hid(vendor_id: u16, product_id: u16, lengths: ReportLengths) -> Self {
        MockDevice {
            attributes: Some(HidAttributes {
                vendor_id,
                product_id,
                version: 0x0100,
            }),
            report_lengths: lengths,
            ..MockDevice::default()
        }
    }
}

/// Opaque handle issued by [`MockApi::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockHandle(pub u64);

/// Opaque close signal issued by [`MockApi::create_signal`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MockSignal(u64);

enum MockBuf<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// In-flight operation token. Dropping it retires the operation.
pub struct MockPending<'a> {
    api: &'a MockApi,
    id: u64,
    buf: MockBuf<'a>,
}

impl Drop for MockPending<'_> {
    fn drop(&mut self) {
        let mut state = self.api.state();
        state.ops.remove(&self.id);
        drop(state);
        self.api.changed.notify_all();
    }
}

struct OpState {
    /// `None` = never becomes ready on its own.
    ready_at: Option<Instant>,
    cancelled: bool,
    outcome: Outcome,
}

impl OpState {
    fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.is_some_and(|t| t <= now)
    }
}

#[derive(Default)]
struct SignalState {
    raised: bool,
    frees: usize,
}

#[derive(Default)]
struct MockState {
    interfaces: HashMap<DeviceKind, std::result::Result<Vec<RawInterface>, NativeError>>,
    walk_failures: HashMap<DeviceKind, (u32, NativeError)>,
    properties: HashMap<(InstanceRef, DeviceProperty), String>,
    filesystems: HashMap<String, String>,
    devices: HashMap<String, MockDevice>,

    next_id: u64,
    handles: HashMap<MockHandle, String>,
    opens: Vec<(String, OpenMode)>,
    handle_frees: usize,
    signals: HashMap<u64, SignalState>,
    fail_create_signal: bool,

    reads: HashMap<String, VecDeque<MockIo>>,
    write_script: HashMap<String, VecDeque<MockIo>>,
    ops: HashMap<u64, OpState>,
    cancels: usize,

    written: HashMap<String, Vec<Vec<u8>>>,
    line_configs: HashMap<String, Vec<LineConfig>>,
    purges: HashMap<String, usize>,
    input_buffers: HashMap<String, Vec<u32>>,
    feature_writes: HashMap<String, Vec<Vec<u8>>>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn path_of(&self, handle: MockHandle) -> std::result::Result<String, NativeError> {
        self.handles
            .get(&handle)
            .cloned()
            .ok_or(NativeError::Os(INVALID_HANDLE))
    }

    fn device_of(&self, handle: MockHandle) -> std::result::Result<&MockDevice, NativeError> {
        let path = self.path_of(handle)?;
        self.devices
            .get(&path)
            .ok_or(NativeError::Os(INVALID_HANDLE))
    }
}

/// Scriptable, thread-safe implementation of [`NativeDeviceApi`].
pub struct MockApi {
    state: Mutex<MockState>,
    changed: Condvar,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    pub fn new() -> Self {
        MockApi {
            state: Mutex::new(MockState::default()),
            changed: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Setup ──

    /// Register an interface for `kind`, optionally bound to a device instance.
    pub fn add_interface(&self, kind: DeviceKind, raw_path: &str, instance: Option<u32>) {
        let mut state = self.state();
        let entry = state.interfaces.entry(kind).or_insert_with(|| Ok(Vec::new()));
        if let Ok(list) = entry {
            list.push(RawInterface {
                raw_path: raw_path.to_string(),
                instance: instance.map(InstanceRef),
            });
        }
    }

    /// Make enumeration of `kind` fail with `error`.
    pub fn fail_enumeration(&self, kind: DeviceKind, error: NativeError) {
        self.state().interfaces.insert(kind, Err(error));
    }

    /// Make the interface walk of `kind` fail with `error` at `index`.
    pub fn fail_enumeration_at(&self, kind: DeviceKind, index: u32, error: NativeError) {
        self.state().walk_failures.insert(kind, (index, error));
    }

    pub fn set_property(&self, instance: u32, property: DeviceProperty, value: &str) {
        self.state()
            .properties
            .insert((InstanceRef(instance), property), value.to_string());
    }

    pub fn set_filesystem(&self, root: &str, name: &str) {
        self.state()
            .filesystems
            .insert(root.to_string(), name.to_string());
    }

    /// Register (or replace) the device answering opens of `path`.
    pub fn add_device(&self, path: &str, device: MockDevice) {
        self.state().devices.insert(path.to_string(), device);
    }

    pub fn fail_create_signal(&self, fail: bool) {
        self.state().fail_create_signal = fail;
    }

    /// Queue a read step for `path`. Reads with an empty queue never complete.
    pub fn push_read(&self, path: &str, io: MockIo) {
        self.state()
            .reads
            .entry(path.to_string())
            .or_default()
            .push_back(io);
    }

    /// Queue a write step for `path`. Writes with an empty queue complete
    /// synchronously with the full buffer.
    pub fn push_write(&self, path: &str, io: MockIo) {
        self.state()
            .write_script
            .entry(path.to_string())
            .or_default()
            .push_back(io);
    }

    // ── Inspection ──

    pub fn open_handle_count(&self) -> usize {
        self.state().handles.len()
    }

    /// Total `close_handle` calls.
    pub fn handle_frees(&self) -> usize {
        self.state().handle_frees
    }

    /// Total `free_signal` calls across all signals.
    pub fn signal_frees(&self) -> usize {
        self.state().signals.values().map(|s| s.frees).sum()
    }

    pub fn is_signal_raised(&self, signal: &MockSignal) -> bool {
        self.state()
            .signals
            .get(&signal.0)
            .is_some_and(|s| s.raised)
    }

    /// Every `(path, mode)` passed to `open`, in order.
    pub fn opens(&self) -> Vec<(String, OpenMode)> {
        self.state().opens.clone()
    }

    /// Operations currently in flight.
    pub fn pending_count(&self) -> usize {
        self.state().ops.len()
    }

    /// Block until at least `n` operations are in flight or `timeout` passes.
    pub fn wait_for_pending(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state();
        while state.ops.len() < n {
            let now = Instant::now();
            let Some(deadline) = deadline else {
                state = self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Total `cancel` calls.
    pub fn cancel_count(&self) -> usize {
        self.state().cancels
    }

    /// Buffers passed to `begin_write` for `path`, in order.
    pub fn written(&self, path: &str) -> Vec<Vec<u8>> {
        self.state().written.get(path).cloned().unwrap_or_default()
    }

    pub fn line_configs(&self, path: &str) -> Vec<LineConfig> {
        self.state()
            .line_configs
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn purge_count(&self, path: &str) -> usize {
        self.state().purges.get(path).copied().unwrap_or(0)
    }

    pub fn input_buffer_requests(&self, path: &str) -> Vec<u32> {
        self.state()
            .input_buffers
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn feature_writes(&self, path: &str) -> Vec<Vec<u8>> {
        self.state()
            .feature_writes
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    // ── Overlapped helpers ──

    fn begin<'a>(
        &'a self,
        handle: MockHandle,
        buf: MockBuf<'a>,
    ) -> std::result::Result<Begin<MockPending<'a>>, NativeError> {
        let mut state = self.state();
        let path = state.path_of(handle)?;
        let step = match &buf {
            MockBuf::Read(_) => state.reads.get_mut(&path).and_then(VecDeque::pop_front),
            MockBuf::Write(data) => {
                state
                    .written
                    .entry(path.clone())
                    .or_default()
                    .push(data.to_vec());
                Some(
                    state
                        .write_script
                        .get_mut(&path)
                        .and_then(VecDeque::pop_front)
                        .unwrap_or(MockIo {
                            completion: Completion::Sync,
                            outcome: Outcome::Full,
                        }),
                )
            }
        };
        let step = step.unwrap_or_else(MockIo::never);

        let ready_at = match step.completion {
            Completion::Sync => {
                drop(state);
                let mut buf = buf;
                return finish(&mut buf, &step.outcome).map(Begin::Completed);
            }
            Completion::After(delay) => Instant::now().checked_add(delay),
            Completion::Never => None,
        };
        let id = state.next_id();
        state.ops.insert(
            id,
            OpState {
                ready_at,
                cancelled: false,
                outcome: step.outcome,
            },
        );
        drop(state);
        self.changed.notify_all();
        Ok(Begin::Pending(MockPending { api: self, id, buf }))
    }
}

/// Apply an outcome to the caller's buffer and return the byte count.
fn finish(buf: &mut MockBuf<'_>, outcome: &Outcome) -> std::result::Result<usize, NativeError> {
    match (buf, outcome) {
        (_, Outcome::Error(e)) => Err(*e),
        (MockBuf::Read(dst), Outcome::Data(src)) => {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            Ok(n)
        }
        (MockBuf::Write(src), Outcome::Transferred(n)) => Ok((*n).min(src.len())),
        (MockBuf::Write(src), Outcome::Full) => Ok(src.len()),
        (MockBuf::Read(_), _) | (MockBuf::Write(_), Outcome::Data(_)) => {
            Err(NativeError::Os(87))
        }
    }
}

impl NativeDeviceApi for MockApi {
    type Handle = MockHandle;
    type Signal = MockSignal;
    type Pending<'a> = MockPending<'a>;

    fn enumerate_interfaces(
        &self,
        kind: DeviceKind,
    ) -> std::result::Result<Vec<RawInterface>, NativeError> {
        let state = self.state();
        let listed = match state.interfaces.get(&kind) {
            Some(Ok(list)) => list.as_slice(),
            Some(Err(e)) => return Err(*e),
            None => &[],
        };
        let failure = state.walk_failures.get(&kind).copied();
        walk_interfaces(|index| match failure {
            Some((at, e)) if at == index => Err(e),
            _ => listed
                .get(index as usize)
                .cloned()
                .ok_or(NativeError::NoMoreItems),
        })
    }

    fn string_property(&self, instance: InstanceRef, property: DeviceProperty) -> Option<String> {
        self.state().properties.get(&(instance, property)).cloned()
    }

    fn filesystem_name(&self, root: &str) -> Option<String> {
        self.state().filesystems.get(root).cloned()
    }

    fn open(&self, path: &str, mode: OpenMode) -> std::result::Result<MockHandle, NativeError> {
        let mut state = self.state();
        state.opens.push((path.to_string(), mode));
        let device = state
            .devices
            .get(path)
            .ok_or(NativeError::Os(FILE_NOT_FOUND))?;
        if let Some(e) = device.open_error {
            return Err(e);
        }
        let handle = MockHandle(state.next_id());
        state.handles.insert(handle, path.to_string());
        Ok(handle)
    }

    fn close_handle(&self, handle: MockHandle) {
        let mut state = self.state();
        state.handles.remove(&handle);
        state.handle_frees += 1;
    }

    fn hid_attributes(&self, handle: MockHandle) -> std::result::Result<HidAttributes, NativeError> {
        let state = self.state();
        state.device_of(handle)?.attributes.ok_or(NativeError::Os(1))
    }

    fn hid_report_lengths(
        &self,
        handle: MockHandle,
    ) -> std::result::Result<ReportLengths, NativeError> {
        let state = self.state();
        let device = state.device_of(handle)?;
        match device.caps_error {
            Some(e) => Err(e),
            None => Ok(device.report_lengths),
        }
    }

    fn hid_usage(&self, handle: MockHandle) -> std::result::Result<HidUsage, NativeError> {
        let state = self.state();
        let device = state.device_of(handle)?;
        match device.caps_error {
            Some(e) => Err(e),
            None => Ok(device.usage),
        }
    }

    fn hid_set_input_buffers(
        &self,
        handle: MockHandle,
        count: u32,
    ) -> std::result::Result<(), NativeError> {
        let mut state = self.state();
        let path = state.path_of(handle)?;
        if let Some(e) = state.device_of(handle)?.input_buffers_error {
            return Err(e);
        }
        state.input_buffers.entry(path).or_default().push(count);
        Ok(())
    }

    fn hid_get_feature(
        &self,
        handle: MockHandle,
        buf: &mut [u8],
    ) -> std::result::Result<(), NativeError> {
        let state = self.state();
        let report = &state.device_of(handle)?.feature_report;
        let n = report.len().min(buf.len());
        buf[..n].copy_from_slice(&report[..n]);
        Ok(())
    }

    fn hid_set_feature(&self, handle: MockHandle, buf: &[u8]) -> std::result::Result<(), NativeError> {
        let mut state = self.state();
        let path = state.path_of(handle)?;
        state.feature_writes.entry(path).or_default().push(buf.to_vec());
        Ok(())
    }

    fn hid_string(&self, handle: MockHandle, which: HidString) -> Option<String> {
        let state = self.state();
        state.device_of(handle).ok()?.strings.get(&which).cloned()
    }

    fn apply_line_config(
        &self,
        handle: MockHandle,
        config: &LineConfig,
    ) -> std::result::Result<(), NativeError> {
        let mut state = self.state();
        let path = state.path_of(handle)?;
        if let Some(e) = state.device_of(handle)?.line_config_error {
            return Err(e);
        }
        state.line_configs.entry(path).or_default().push(*config);
        Ok(())
    }

    fn purge(&self, handle: MockHandle) -> std::result::Result<(), NativeError> {
        let mut state = self.state();
        let path = state.path_of(handle)?;
        if let Some(e) = state.device_of(handle)?.purge_error {
            return Err(e);
        }
        *state.purges.entry(path).or_default() += 1;
        Ok(())
    }

    fn create_signal(&self) -> std::result::Result<MockSignal, NativeError> {
        let mut state = self.state();
        if state.fail_create_signal {
            return Err(NativeError::Os(1450));
        }
        let id = state.next_id();
        state.signals.insert(id, SignalState::default());
        Ok(MockSignal(id))
    }

    fn raise_signal(&self, signal: &MockSignal) {
        if let Some(s) = self.state().signals.get_mut(&signal.0) {
            s.raised = true;
        }
        self.changed.notify_all();
    }

    fn free_signal(&self, signal: &MockSignal) {
        if let Some(s) = self.state().signals.get_mut(&signal.0) {
            s.frees += 1;
        }
    }

    fn begin_read<'a>(
        &'a self,
        handle: MockHandle,
        buf: &'a mut [u8],
    ) -> std::result::Result<Begin<MockPending<'a>>, NativeError> {
        self.begin(handle, MockBuf::Read(buf))
    }

    fn begin_write<'a>(
        &'a self,
        handle: MockHandle,
        buf: &'a [u8],
    ) -> std::result::Result<Begin<MockPending<'a>>, NativeError> {
        self.begin(handle, MockBuf::Write(buf))
    }

    fn wait(
        &self,
        pending: &MockPending<'_>,
        close: &MockSignal,
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        // A deadline past the representable range waits without bound.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.state();
        loop {
            let now = Instant::now();
            let ready_at = state.ops.get(&pending.id).and_then(|op| op.ready_at);
            if ready_at.is_some_and(|t| t <= now) {
                return WaitOutcome::Completed;
            }
            if state.signals.get(&close.0).is_some_and(|s| s.raised) {
                return WaitOutcome::Closed;
            }
            if deadline.is_some_and(|d| d <= now) {
                return WaitOutcome::TimedOut;
            }
            let wake = match (ready_at, deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            state = match wake {
                Some(t) => {
                    self.changed
                        .wait_timeout(state, t.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn cancel(&self, _handle: MockHandle, pending: &MockPending<'_>) {
        let mut state = self.state();
        state.cancels += 1;
        if let Some(op) = state.ops.get_mut(&pending.id) {
            op.cancelled = true;
        }
        drop(state);
        self.changed.notify_all();
    }

    fn get_result(
        &self,
        _handle: MockHandle,
        mut pending: MockPending<'_>,
    ) -> std::result::Result<usize, NativeError> {
        let mut state = self.state();
        let outcome = loop {
            let now = Instant::now();
            let Some(op) = state.ops.get(&pending.id) else {
                return Err(NativeError::Os(INVALID_HANDLE));
            };
            if op.is_ready(now) {
                break op.outcome.clone();
            }
            if op.cancelled {
                break Outcome::Error(NativeError::Aborted);
            }
            let ready_at = op.ready_at;
            state = match ready_at {
                Some(t) => {
                    self.changed
                        .wait_timeout(state, t.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        };
        drop(state);
        finish(&mut pending.buf, &outcome)
    }
}
