//! devport: HID, serial and USB device discovery with cancellable overlapped I/O.

pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod handle;
pub mod identity;
pub mod native;
pub mod overlapped;
pub mod session;

pub use device::{DeviceError, DeviceKind, DeviceRecord};
pub use enumerate::enumerate_devices;
pub use error::DevportError;
pub use session::{DeviceIo, DeviceSession, SessionOptions};
