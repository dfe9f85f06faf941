//! Reference-counted owner of one native handle and its close signal.
//!
//! The guard starts with one implicit reference held on behalf of the
//! session. Every I/O path takes an extra reference through
//! [`HandleGuard::acquire_or_fail`] and gives it back when the returned
//! [`Lease`] drops. [`HandleGuard::request_close`] raises the close signal
//! and drops the implicit reference; whoever drops the count to zero frees
//! the handle and the signal. Nothing here blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::device::{DeviceError, Result};
use crate::native::{NativeDeviceApi, NativeError};

pub struct HandleGuard<A: NativeDeviceApi> {
    api: Arc<A>,
    handle: A::Handle,
    close_signal: A::Signal,
    ref_count: AtomicUsize,
    closed: AtomicBool,
}

impl<A: NativeDeviceApi> HandleGuard<A> {
    /// Open a handle with `open_fn` and wrap it together with a fresh close signal.
    ///
    /// Fails with `HandleInvalid` when `open_fn` fails. If the signal cannot
    /// be created the handle is closed again before returning.
    pub fn open(
        api: Arc<A>,
        open_fn: impl FnOnce(&A) -> std::result::Result<A::Handle, NativeError>,
    ) -> Result<Self> {
        let handle =
            open_fn(&api).map_err(|e| DeviceError::HandleInvalid(format!("open: {e}")))?;
        let close_signal = match api.create_signal() {
            Ok(signal) => signal,
            Err(e) => {
                api.close_handle(handle);
                return Err(DeviceError::io("create close signal", e));
            }
        };
        log::debug!("handle {handle:?} opened");
        Ok(HandleGuard {
            api,
            handle,
            close_signal,
            ref_count: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Take a reference if the guard is open and still live.
    ///
    /// A count that has reached zero stays at zero: a freed guard is never
    /// revived.
    pub fn try_acquire(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Take a reference or fail with `Disposed`. The reference is returned
    /// when the lease drops.
    pub fn acquire_or_fail(&self) -> Result<Lease<'_, A>> {
        if self.try_acquire() {
            Ok(Lease { guard: self })
        } else {
            Err(DeviceError::Disposed)
        }
    }

    /// Drop one reference; the last one frees the signal, then the handle.
    pub fn release(&self) {
        let previous =
            self.ref_count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.free(),
            Ok(_) => {}
            Err(_) => log::error!("handle {:?}: release without a reference", self.handle),
        }
    }

    /// Mark the guard closed. Only the first caller gets `true`; it raises
    /// the close signal (waking every in-flight wait) and drops the implicit
    /// reference taken at open.
    pub fn request_close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        log::debug!("handle {:?}: close requested", self.handle);
        self.api.raise_signal(&self.close_signal);
        self.release();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current reference count (0 once freed).
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn free(&self) {
        log::debug!("handle {:?}: freeing", self.handle);
        self.api.free_signal(&self.close_signal);
        self.api.close_handle(self.handle);
    }
}

impl<A: NativeDeviceApi> Drop for HandleGuard<A> {
    fn drop(&mut self) {
        // No lease can outlive the guard, so this drops the last reference.
        self.request_close();
    }
}

/// One counted use of the guard's handle.
pub struct Lease<'g, A: NativeDeviceApi> {
    guard: &'g HandleGuard<A>,
}

impl<A: NativeDeviceApi> Lease<'_, A> {
    pub fn handle(&self) -> A::Handle {
        self.guard.handle
    }

    pub fn close_signal(&self) -> &A::Signal {
        &self.guard.close_signal
    }

    pub fn api(&self) -> &A {
        &self.guard.api
    }
}

impl<A: NativeDeviceApi> Drop for Lease<'_, A> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
