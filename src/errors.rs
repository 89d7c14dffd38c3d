// SPDX-License-Identifier: MPL-2.0

//! Error types for the interval capture core
//!
//! Errors are split by where they originate:
//!
//! - [`HardwareError`]: reported by a camera backend
//! - [`StorageError`]: reported by a [`PhotoStore`](crate::storage::PhotoStore)
//! - [`ConfigError`]: reading or writing the persisted configuration
//! - [`OrchestratorError`]: what the control surface hands back to callers

use crate::backends::camera::types::CameraState;
use std::fmt;

/// Result type alias for backend calls
pub type HardwareResult<T> = Result<T, HardwareError>;

/// Result type alias for control surface calls
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Camera subsystem errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// Camera subsystem or the requested camera is not available
    Unavailable(String),
    /// Opening the device failed
    OpenFailed(String),
    /// Building the capture session failed
    ConfigureFailed(String),
    /// A single capture request failed
    CaptureFailed(String),
    /// The device refused a settings snapshot
    SettingsRejected(String),
    /// The device went away
    Disconnected,
    /// Operation on a handle that was already closed
    ResourceClosed,
    /// Low-level I/O failure
    Io(String),
}

/// Persistence errors, one per commit phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Could not reserve a storage entry
    ReserveFailed(String),
    /// Writing the image bytes failed (reservation rolled back)
    WriteFailed(String),
    /// Making the entry visible failed (reservation rolled back)
    FinalizeFailed(String),
}

/// Configuration file errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config directory could be determined
    NoConfigDir,
    /// Reading or writing the file failed
    Io(String),
    /// The file contents are not valid configuration
    Parse(String),
}

/// Errors surfaced by the interval capture control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Bad interval, shot count or settings request
    InvalidArgument(String),
    /// Operation attempted outside its legal camera state
    NotReady(CameraState),
    /// Failure reported by the camera backend
    Hardware(HardwareError),
    /// Failure reported by the photo store
    Storage(StorageError),
    /// Camera did not become ready within the grace delay after `start`
    CameraNotReady,
    /// Operation on a camera handle that is no longer open
    ResourceClosed,
    /// A pending `start` was superseded before it could begin
    Cancelled,
    /// The owner task is no longer running
    Shutdown,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::Unavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            HardwareError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            HardwareError::ConfigureFailed(msg) => {
                write!(f, "Failed to configure capture session: {}", msg)
            }
            HardwareError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            HardwareError::SettingsRejected(msg) => write!(f, "Settings rejected: {}", msg),
            HardwareError::Disconnected => write!(f, "Camera disconnected"),
            HardwareError::ResourceClosed => write!(f, "Camera handle already closed"),
            HardwareError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ReserveFailed(msg) => write!(f, "Failed to reserve storage: {}", msg),
            StorageError::WriteFailed(msg) => write!(f, "Failed to write image: {}", msg),
            StorageError::FinalizeFailed(msg) => write!(f, "Failed to finalize image: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
            ConfigError::Io(msg) => write!(f, "Configuration I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            OrchestratorError::NotReady(state) => {
                write!(f, "Camera not ready (state: {})", state)
            }
            OrchestratorError::Hardware(e) => write!(f, "Hardware error: {}", e),
            OrchestratorError::Storage(e) => write!(f, "Storage error: {}", e),
            OrchestratorError::CameraNotReady => {
                write!(f, "Camera did not become ready in time")
            }
            OrchestratorError::ResourceClosed => write!(f, "Camera resource closed"),
            OrchestratorError::Cancelled => write!(f, "Request superseded"),
            OrchestratorError::Shutdown => write!(f, "Capture service has shut down"),
        }
    }
}

impl std::error::Error for HardwareError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for OrchestratorError {}

impl From<HardwareError> for OrchestratorError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::ResourceClosed => OrchestratorError::ResourceClosed,
            other => OrchestratorError::Hardware(other),
        }
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        OrchestratorError::Storage(err)
    }
}

impl From<std::io::Error> for HardwareError {
    fn from(err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(libc::ENODEV) {
            HardwareError::Disconnected
        } else {
            HardwareError::Io(err.to_string())
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
