//! Unified error type for the devport-lib crate.
//!
//! [`DevportError`] wraps the session error taxonomy ([`DeviceError`]),
//! standard I/O errors from config persistence, and configuration problems.
//! `From` impls allow `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for devport-lib operations.
#[derive(Debug)]
pub enum DevportError {
    /// Device open, read, write or close error.
    Device(DeviceError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for DevportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevportError::Device(e) => write!(f, "{e}"),
            DevportError::Io(e) => write!(f, "I/O error: {e}"),
            DevportError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for DevportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DevportError::Device(e) => Some(e),
            DevportError::Io(e) => Some(e),
            DevportError::Config(_) => None,
        }
    }
}

impl From<DeviceError> for DevportError {
    fn from(e: DeviceError) -> Self {
        DevportError::Device(e)
    }
}

impl From<std::io::Error> for DevportError {
    fn from(e: std::io::Error) -> Self {
        DevportError::Io(e)
    }
}

/// Crate-level Result alias using [`DevportError`].
pub type Result<T> = std::result::Result<T, DevportError>;
