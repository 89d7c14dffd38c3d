// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! Backends implement [`CameraHardware`], a request/callback interface: the
//! long running operations (`open`, `create_session`, `capture`) return as
//! soon as the request is accepted and report the outcome later as a
//! [`HardwareEvent`] on the channel handed to `open`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  IntervalCamera (owner)  │  ← schedule, single owner task
//! └────────────┬─────────────┘
//!              │ calls              ▲ HardwareEvent (mpsc)
//!              ▼                    │
//! ┌──────────────────────────┐      │
//! │ CameraResourceManager    │  ← state machine, handle ownership
//! └────────────┬─────────────┘      │
//!              ▼                    │
//! ┌──────────────────────────┐      │
//! │  CameraHardware trait    │──────┘
//! └────────────┬─────────────┘
//!        ┌─────┴──────┐
//!        ▼            ▼
//!    ┌──────┐   ┌─────────┐
//!    │ V4L2 │   │ Virtual │
//!    └──────┘   └─────────┘
//! ```

pub mod capabilities;
pub mod format_converters;
pub mod manager;
pub mod types;
pub mod v4l2;
pub mod v4l2_controls;

pub use capabilities::{CapabilitySet, ExposureRange, ZoomRange};
pub use manager::{CameraResourceManager, ManagerNotice};
pub use types::*;

use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
use crate::errors::HardwareResult;

/// Camera subsystem boundary
///
/// Every method is called from the single owner task. Implementations that
/// block on device I/O must move that work elsewhere and report back through
/// the event channel.
pub trait CameraHardware: Send {
    // ===== Enumeration =====

    /// List the cameras this backend can open
    fn enumerate_cameras(&self) -> HardwareResult<Vec<CameraDescriptor>>;

    /// Report what a camera supports
    ///
    /// Unsupported features are described (empty lists, degenerate ranges)
    /// rather than returned as errors.
    fn query_capabilities(&self, camera: &CameraId) -> HardwareResult<CapabilitySet>;

    // ===== Lifecycle =====

    /// Start opening a camera
    ///
    /// The outcome is reported as [`HardwareEvent::Opened`] or
    /// [`HardwareEvent::OpenFailed`] carrying `handle.token()`. All later
    /// callbacks for this handle go to `events` as well.
    ///
    /// # Returns
    /// * `Ok(())` - Request accepted
    /// * `Err(HardwareError)` - Request refused, no event will follow
    fn open(&mut self, handle: &CameraHandle, events: HardwareEventSender) -> HardwareResult<()>;

    /// Start building a capture session for an opened handle
    ///
    /// Reported as [`HardwareEvent::SessionConfigured`] or
    /// [`HardwareEvent::SessionFailed`].
    fn create_session(&mut self, handle: &CameraHandle, sink: ImageSink) -> HardwareResult<()>;

    /// Push a negotiated settings snapshot to the device
    ///
    /// Must be all or nothing: on error the previous snapshot stays active.
    fn apply_settings(
        &mut self,
        handle: &CameraHandle,
        settings: &CaptureSettings,
    ) -> HardwareResult<()>;

    /// Request one still image
    ///
    /// Reported as [`HardwareEvent::CaptureCompleted`]. At most one request
    /// is outstanding per session.
    fn capture(&mut self, session: &CaptureSession) -> HardwareResult<()>;

    /// Tear down a capture session
    fn release_session(&mut self, session: CaptureSession);

    /// Close a camera handle (also cancels a pending open)
    fn close(&mut self, handle: CameraHandle);
}

/// Create the hardware backend for a backend type
pub fn create_backend(backend_type: CameraBackendType) -> Box<dyn CameraHardware> {
    match backend_type {
        CameraBackendType::V4l2 => Box::new(v4l2::V4l2Camera::new()),
        CameraBackendType::Virtual => Box::new(VirtualCamera::new(VirtualCameraConfig::default())),
    }
}

/// Pick the camera to open for a lens facing
///
/// Prefers the first camera with the requested facing, then the first camera
/// at all.
pub fn select_camera(
    cameras: &[CameraDescriptor],
    facing: LensFacing,
) -> Option<&CameraDescriptor> {
    cameras
        .iter()
        .find(|camera| camera.facing == facing)
        .or_else(|| cameras.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, facing: LensFacing) -> CameraDescriptor {
        CameraDescriptor {
            id: CameraId::new(id),
            facing,
            name: id.to_string(),
        }
    }

    #[test]
    fn test_select_camera_by_facing() {
        let cameras = vec![
            descriptor("rear", LensFacing::Back),
            descriptor("selfie", LensFacing::Front),
        ];
        let picked = select_camera(&cameras, LensFacing::Front).unwrap();
        assert_eq!(picked.id, CameraId::new("selfie"));
    }

    #[test]
    fn test_select_camera_falls_back_to_first() {
        let cameras = vec![descriptor("video0", LensFacing::Back)];
        let picked = select_camera(&cameras, LensFacing::Front).unwrap();
        assert_eq!(picked.id, CameraId::new("video0"));
        assert!(select_camera(&[], LensFacing::Back).is_none());
    }
}
