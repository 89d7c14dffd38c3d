// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends
//!
//! Handles and sessions are plain ownership tokens: the resource manager
//! creates them, passes them to the backend by reference, and gives them
//! back by value when the resource is released. A released handle can no
//! longer be named, so it can not be reused by mistake.

use crate::errors::{HardwareError, HardwareResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Video4Linux2 devices under /dev/video*
    #[default]
    V4l2,
    /// Simulated two-lens camera
    Virtual,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "v4l2"),
            CameraBackendType::Virtual => write!(f, "virtual"),
        }
    }
}

impl FromStr for CameraBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v4l2" => Ok(CameraBackendType::V4l2),
            "virtual" => Ok(CameraBackendType::Virtual),
            other => Err(format!("unknown backend '{}' (expected v4l2 or virtual)", other)),
        }
    }
}

/// Stable identifier of a physical camera as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraId(pub String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which way a camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LensFacing {
    Front,
    #[default]
    Back,
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Front => write!(f, "front"),
            LensFacing::Back => write!(f, "back"),
        }
    }
}

impl FromStr for LensFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(LensFacing::Front),
            "back" | "rear" => Ok(LensFacing::Back),
            other => Err(format!("unknown lens facing '{}' (expected front or back)", other)),
        }
    }
}

/// One entry of `enumerate_cameras`
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDescriptor {
    pub id: CameraId,
    pub facing: LensFacing,
    /// Human readable name (V4L2 card name, "Virtual back camera", ...)
    pub name: String,
}

/// Focus behaviour requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FocusMode {
    /// Camera decides (continuous picture autofocus where available)
    #[default]
    Auto,
    /// Continuous autofocus
    Continuous,
    /// Autofocus disabled, lens stays where it is
    Manual,
}

impl FocusMode {
    pub const ALL: [FocusMode; 3] = [FocusMode::Auto, FocusMode::Continuous, FocusMode::Manual];
}

impl std::fmt::Display for FocusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FocusMode::Auto => write!(f, "auto"),
            FocusMode::Continuous => write!(f, "continuous"),
            FocusMode::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for FocusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FocusMode::ALL
            .into_iter()
            .find(|mode| mode.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown focus mode '{}'", s))
    }
}

/// White balance presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WhiteBalance {
    #[default]
    Auto,
    Daylight,
    Cloudy,
    Incandescent,
    Fluorescent,
}

impl WhiteBalance {
    pub const ALL: [WhiteBalance; 5] = [
        WhiteBalance::Auto,
        WhiteBalance::Daylight,
        WhiteBalance::Cloudy,
        WhiteBalance::Incandescent,
        WhiteBalance::Fluorescent,
    ];

    /// Nominal colour temperature of a preset in Kelvin (`None` for Auto)
    pub fn kelvin(&self) -> Option<u32> {
        match self {
            WhiteBalance::Auto => None,
            WhiteBalance::Daylight => Some(5500),
            WhiteBalance::Cloudy => Some(6500),
            WhiteBalance::Incandescent => Some(2800),
            WhiteBalance::Fluorescent => Some(4000),
        }
    }
}

impl std::fmt::Display for WhiteBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhiteBalance::Auto => write!(f, "auto"),
            WhiteBalance::Daylight => write!(f, "daylight"),
            WhiteBalance::Cloudy => write!(f, "cloudy"),
            WhiteBalance::Incandescent => write!(f, "incandescent"),
            WhiteBalance::Fluorescent => write!(f, "fluorescent"),
        }
    }
}

impl FromStr for WhiteBalance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WhiteBalance::ALL
            .into_iter()
            .find(|wb| wb.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown white balance '{}'", s))
    }
}

/// Immutable snapshot of user capture parameters
///
/// A snapshot is applied as a whole. If the backend refuses it the previously
/// applied snapshot stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub lens_facing: LensFacing,
    pub zoom_ratio: f32,
    pub focus_mode: FocusMode,
    /// Exposure compensation in backend steps (0 = no compensation)
    pub exposure_index: i32,
    pub white_balance: WhiteBalance,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            lens_facing: LensFacing::Back,
            zoom_ratio: 1.0,
            focus_mode: FocusMode::Auto,
            exposure_index: 0,
            white_balance: WhiteBalance::Auto,
        }
    }
}

impl std::fmt::Display for CaptureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lens={} zoom={:.1}x focus={} exposure={:+} wb={}",
            self.lens_facing,
            self.zoom_ratio,
            self.focus_mode,
            self.exposure_index,
            self.white_balance
        )
    }
}

/// Token that ties backend callbacks to one open of one camera
///
/// Allocated by the resource manager for every `open`. Callbacks carrying a
/// token that no longer matches the open handle are stale and get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleToken(pub u64);

impl std::fmt::Display for HandleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ownership token for an open physical camera
#[derive(Debug, PartialEq, Eq)]
pub struct CameraHandle {
    token: HandleToken,
    camera: CameraId,
}

impl CameraHandle {
    pub(crate) fn new(token: HandleToken, camera: CameraId) -> Self {
        Self { token, camera }
    }

    pub fn token(&self) -> HandleToken {
        self.token
    }

    pub fn camera(&self) -> &CameraId {
        &self.camera
    }
}

/// Destination for still images, sized to the negotiated resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSink {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for ImageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Configured pipeline binding one camera handle to one image sink
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureSession {
    token: HandleToken,
    sink: ImageSink,
}

impl CaptureSession {
    pub(crate) fn new(token: HandleToken, sink: ImageSink) -> Self {
        Self { token, sink }
    }

    /// Token of the handle this session is bound to
    pub fn token(&self) -> HandleToken {
        self.token
    }

    pub fn sink(&self) -> ImageSink {
        self.sink
    }
}

/// Encoded still image delivered by a capture request
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// JPEG bytes
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Wall-clock time the frame was taken, used for file naming
    pub captured_at: DateTime<Local>,
}

/// Callback from a backend, marshalled onto the owner task
#[derive(Debug)]
pub enum HardwareEvent {
    /// Device opened, ready for a session
    Opened { token: HandleToken },
    /// Device could not be opened
    OpenFailed {
        token: HandleToken,
        error: HardwareError,
    },
    /// Capture session is configured
    SessionConfigured { token: HandleToken },
    /// Capture session could not be configured
    SessionFailed {
        token: HandleToken,
        error: HardwareError,
    },
    /// One capture request finished
    CaptureCompleted {
        token: HandleToken,
        result: HardwareResult<CapturedImage>,
    },
    /// Device went away
    Disconnected { token: HandleToken },
    /// Unrecoverable device error
    Error {
        token: HandleToken,
        error: HardwareError,
    },
}

impl HardwareEvent {
    pub fn token(&self) -> HandleToken {
        match self {
            HardwareEvent::Opened { token }
            | HardwareEvent::OpenFailed { token, .. }
            | HardwareEvent::SessionConfigured { token }
            | HardwareEvent::SessionFailed { token, .. }
            | HardwareEvent::CaptureCompleted { token, .. }
            | HardwareEvent::Disconnected { token }
            | HardwareEvent::Error { token, .. } => *token,
        }
    }
}

/// Channel backends post their callbacks to
pub type HardwareEventSender = UnboundedSender<HardwareEvent>;

/// Camera resource lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraState {
    Closed,
    Opening,
    Configuring,
    Ready,
    Capturing,
    Closing,
    /// Hardware error or disconnect; only `close()` leaves this state
    Faulted,
}

impl CameraState {
    /// Whether the device is held open (or being opened)
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            CameraState::Opening
                | CameraState::Configuring
                | CameraState::Ready
                | CameraState::Capturing
        )
    }
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CameraState::Closed => "Closed",
            CameraState::Opening => "Opening",
            CameraState::Configuring => "Configuring",
            CameraState::Ready => "Ready",
            CameraState::Capturing => "Capturing",
            CameraState::Closing => "Closing",
            CameraState::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}
