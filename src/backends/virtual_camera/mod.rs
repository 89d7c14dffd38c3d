// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera hardware
//!
//! Two cameras, one per lens facing, with different capability sets. Every
//! callback is delivered after a configurable latency on the tokio timer, so
//! tests running on a paused clock see deterministic timing. Faults can be
//! scripted through [`VirtualCameraConfig`] and every hardware call is
//! recorded in [`VirtualCameraStats`].
//!
//! ```text
//! open ──(open_latency)──▶ Opened
//! create_session ──(configure_latency)──▶ SessionConfigured
//! capture ──render pattern──▶ JPEG ──(capture_latency)──▶ CaptureCompleted
//! ```

mod pattern;

pub use pattern::{TestPattern, generate_frame};

use crate::backends::camera::CameraHardware;
use crate::backends::camera::capabilities::{CapabilitySet, ExposureRange, ZoomRange};
use crate::backends::camera::types::*;
use crate::errors::{HardwareError, HardwareResult};
use crate::pipelines::photo::{EncodingQuality, PostProcessingConfig, render_yuyv_still};
use chrono::Local;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Identifier of the simulated back camera
pub const BACK_CAMERA_ID: &str = "virtual-back";
/// Identifier of the simulated front camera
pub const FRONT_CAMERA_ID: &str = "virtual-front";

/// Behaviour of the simulated hardware
#[derive(Debug, Clone)]
pub struct VirtualCameraConfig {
    pub open_latency: Duration,
    pub configure_latency: Duration,
    pub capture_latency: Duration,
    /// Report `OpenFailed` for every open
    pub fail_open: bool,
    /// 1-based capture request numbers that report a per-shot failure
    pub failing_captures: Vec<u32>,
    /// 1-based capture request number that disconnects the device instead
    pub disconnect_on_capture: Option<u32>,
    /// Camera subsystem missing entirely
    pub unavailable: bool,
    /// Still resolution of the back camera (the front one is half of it)
    pub resolution: (u32, u32),
    pub pattern: TestPattern,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            open_latency: Duration::from_millis(300),
            configure_latency: Duration::from_millis(200),
            capture_latency: Duration::from_millis(120),
            fail_open: false,
            failing_captures: Vec::new(),
            disconnect_on_capture: None,
            unavailable: false,
            resolution: (1280, 720),
            pattern: TestPattern::ColorBars,
        }
    }
}

impl VirtualCameraConfig {
    /// Zero latencies and tiny frames, callbacks are posted synchronously
    pub fn instant() -> Self {
        Self {
            open_latency: Duration::ZERO,
            configure_latency: Duration::ZERO,
            capture_latency: Duration::ZERO,
            resolution: (32, 24),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    opened: Vec<CameraId>,
    closed_handles: usize,
    sessions_created: Vec<ImageSink>,
    released_sessions: usize,
    capture_requests: Vec<Instant>,
    applied_settings: Vec<CaptureSettings>,
}

/// Record of every call made into the virtual camera
#[derive(Debug, Clone, Default)]
pub struct VirtualCameraStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl VirtualCameraStats {
    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cameras opened, in order
    pub fn opened_cameras(&self) -> Vec<CameraId> {
        self.lock().opened.clone()
    }

    pub fn closed_handles(&self) -> usize {
        self.lock().closed_handles
    }

    /// Sinks of every session created
    pub fn sessions_created(&self) -> Vec<ImageSink> {
        self.lock().sessions_created.clone()
    }

    pub fn released_sessions(&self) -> usize {
        self.lock().released_sessions
    }

    /// Time of every capture request, on the tokio clock
    pub fn capture_requests(&self) -> Vec<Instant> {
        self.lock().capture_requests.clone()
    }

    pub fn capture_count(&self) -> usize {
        self.lock().capture_requests.len()
    }

    /// Every snapshot pushed through `apply_settings`
    pub fn applied_settings(&self) -> Vec<CaptureSettings> {
        self.lock().applied_settings.clone()
    }
}

/// Per-handle state
struct OpenDevice {
    camera: CameraId,
    events: HardwareEventSender,
    settings: CaptureSettings,
    /// Delayed callbacks still in flight, aborted on close
    pending: Vec<JoinHandle<()>>,
}

/// Simulated camera backend
pub struct VirtualCamera {
    config: VirtualCameraConfig,
    stats: VirtualCameraStats,
    devices: HashMap<HandleToken, OpenDevice>,
    capture_counter: u32,
}

impl VirtualCamera {
    pub fn new(config: VirtualCameraConfig) -> Self {
        info!(resolution = ?config.resolution, "Creating virtual camera");
        Self {
            config,
            stats: VirtualCameraStats::default(),
            devices: HashMap::new(),
            capture_counter: 0,
        }
    }

    /// Shared handle to the call record
    pub fn stats(&self) -> VirtualCameraStats {
        self.stats.clone()
    }

    fn descriptors(&self) -> Vec<CameraDescriptor> {
        vec![
            CameraDescriptor {
                id: CameraId::new(BACK_CAMERA_ID),
                facing: LensFacing::Back,
                name: "Virtual back camera".to_string(),
            },
            CameraDescriptor {
                id: CameraId::new(FRONT_CAMERA_ID),
                facing: LensFacing::Front,
                name: "Virtual front camera".to_string(),
            },
        ]
    }

    fn front_resolution(&self) -> (u32, u32) {
        let (w, h) = self.config.resolution;
        // YUYV needs an even width
        (((w / 2).max(2)) & !1, (h / 2).max(1))
    }

    fn capabilities_for(&self, camera: &CameraId) -> HardwareResult<CapabilitySet> {
        match camera.as_str() {
            BACK_CAMERA_ID => Ok(CapabilitySet {
                camera: camera.clone(),
                facing: LensFacing::Back,
                focus_modes: FocusMode::ALL.to_vec(),
                white_balance_modes: WhiteBalance::ALL.to_vec(),
                zoom: ZoomRange { min: 1.0, max: 4.0 },
                exposure: ExposureRange {
                    min: -6,
                    max: 6,
                    step_ev: 1.0 / 3.0,
                },
                still_resolution: self.config.resolution,
            }),
            // Fixed-focus selfie camera without zoom
            FRONT_CAMERA_ID => Ok(CapabilitySet {
                camera: camera.clone(),
                facing: LensFacing::Front,
                focus_modes: vec![FocusMode::Auto],
                white_balance_modes: vec![
                    WhiteBalance::Auto,
                    WhiteBalance::Daylight,
                    WhiteBalance::Cloudy,
                ],
                zoom: ZoomRange::FIXED,
                exposure: ExposureRange {
                    min: -2,
                    max: 2,
                    step_ev: 0.5,
                },
                still_resolution: self.front_resolution(),
            }),
            other => Err(HardwareError::Unavailable(format!(
                "no virtual camera named '{}'",
                other
            ))),
        }
    }

    /// Post a callback now, or after `delay` on the tokio timer
    fn post(&mut self, token: HandleToken, delay: Duration, event: HardwareEvent) {
        let Some(device) = self.devices.get_mut(&token) else {
            return;
        };
        if delay.is_zero() {
            let _ = device.events.send(event);
            return;
        }

        let events = device.events.clone();
        device.pending.retain(|task| !task.is_finished());
        device.pending.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        }));
    }

    fn render(&self, device: &OpenDevice, sink: ImageSink) -> HardwareResult<CapturedImage> {
        let step_ev = self
            .capabilities_for(&device.camera)
            .map(|caps| caps.exposure.step_ev)
            .unwrap_or(0.0);
        let frame = generate_frame(sink.width, sink.height, self.config.pattern);
        let data = render_yuyv_still(
            &frame,
            sink.width,
            sink.height,
            PostProcessingConfig::from_settings(&device.settings, step_ev),
            EncodingQuality::High,
        )
        .map_err(HardwareError::CaptureFailed)?;

        Ok(CapturedImage {
            data: Arc::from(data.into_boxed_slice()),
            width: sink.width,
            height: sink.height,
            captured_at: Local::now(),
        })
    }
}

impl CameraHardware for VirtualCamera {
    fn enumerate_cameras(&self) -> HardwareResult<Vec<CameraDescriptor>> {
        if self.config.unavailable {
            return Err(HardwareError::Unavailable(
                "virtual camera subsystem disabled".to_string(),
            ));
        }
        Ok(self.descriptors())
    }

    fn query_capabilities(&self, camera: &CameraId) -> HardwareResult<CapabilitySet> {
        if self.config.unavailable {
            return Err(HardwareError::Unavailable(
                "virtual camera subsystem disabled".to_string(),
            ));
        }
        self.capabilities_for(camera)
    }

    fn open(&mut self, handle: &CameraHandle, events: HardwareEventSender) -> HardwareResult<()> {
        if self.config.unavailable {
            return Err(HardwareError::Unavailable(
                "virtual camera subsystem disabled".to_string(),
            ));
        }
        self.capabilities_for(handle.camera())?;

        let token = handle.token();
        debug!(camera = %handle.camera(), token = %token, "Virtual camera open requested");
        self.stats.lock().opened.push(handle.camera().clone());
        self.devices.insert(
            token,
            OpenDevice {
                camera: handle.camera().clone(),
                events,
                settings: CaptureSettings::default(),
                pending: Vec::new(),
            },
        );

        let event = if self.config.fail_open {
            HardwareEvent::OpenFailed {
                token,
                error: HardwareError::OpenFailed("simulated open failure".to_string()),
            }
        } else {
            HardwareEvent::Opened { token }
        };
        self.post(token, self.config.open_latency, event);
        Ok(())
    }

    fn create_session(&mut self, handle: &CameraHandle, sink: ImageSink) -> HardwareResult<()> {
        let token = handle.token();
        if !self.devices.contains_key(&token) {
            return Err(HardwareError::ResourceClosed);
        }
        self.stats.lock().sessions_created.push(sink);
        self.post(
            token,
            self.config.configure_latency,
            HardwareEvent::SessionConfigured { token },
        );
        Ok(())
    }

    fn apply_settings(
        &mut self,
        handle: &CameraHandle,
        settings: &CaptureSettings,
    ) -> HardwareResult<()> {
        let device = self
            .devices
            .get_mut(&handle.token())
            .ok_or(HardwareError::ResourceClosed)?;
        device.settings = *settings;
        self.stats.lock().applied_settings.push(*settings);
        Ok(())
    }

    fn capture(&mut self, session: &CaptureSession) -> HardwareResult<()> {
        let token = session.token();
        let device = self
            .devices
            .get(&token)
            .ok_or(HardwareError::ResourceClosed)?;

        self.capture_counter += 1;
        let request = self.capture_counter;
        self.stats.lock().capture_requests.push(Instant::now());
        debug!(request, token = %token, "Virtual capture requested");

        let event = if self.config.disconnect_on_capture == Some(request) {
            HardwareEvent::Disconnected { token }
        } else if self.config.failing_captures.contains(&request) {
            HardwareEvent::CaptureCompleted {
                token,
                result: Err(HardwareError::CaptureFailed(format!(
                    "simulated failure of capture {}",
                    request
                ))),
            }
        } else {
            HardwareEvent::CaptureCompleted {
                token,
                result: self.render(device, session.sink()),
            }
        };
        self.post(token, self.config.capture_latency, event);
        Ok(())
    }

    fn release_session(&mut self, session: CaptureSession) {
        debug!(token = %session.token(), "Virtual session released");
        self.stats.lock().released_sessions += 1;
    }

    fn close(&mut self, handle: CameraHandle) {
        if let Some(device) = self.devices.remove(&handle.token()) {
            for task in device.pending {
                task.abort();
            }
        }
        debug!(camera = %handle.camera(), "Virtual camera closed");
        self.stats.lock().closed_handles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_two_cameras_with_distinct_capabilities() {
        let camera = VirtualCamera::new(VirtualCameraConfig::instant());
        let cameras = camera.enumerate_cameras().unwrap();
        assert_eq!(cameras.len(), 2);

        let back = camera.query_capabilities(&cameras[0].id).unwrap();
        let front = camera.query_capabilities(&cameras[1].id).unwrap();
        assert!(back.zoom.is_supported());
        assert!(!front.zoom.is_supported());
        assert_eq!(front.focus_modes, vec![FocusMode::Auto]);
    }

    #[test]
    fn test_unavailable_subsystem() {
        let camera = VirtualCamera::new(VirtualCameraConfig {
            unavailable: true,
            ..VirtualCameraConfig::instant()
        });
        assert!(matches!(
            camera.enumerate_cameras(),
            Err(HardwareError::Unavailable(_))
        ));
    }

    #[test]
    fn test_capture_renders_jpeg() {
        let mut camera = VirtualCamera::new(VirtualCameraConfig::instant());
        let (tx, mut rx) = unbounded_channel();
        let handle = CameraHandle::new(HandleToken(7), CameraId::new(BACK_CAMERA_ID));
        camera.open(&handle, tx).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(HardwareEvent::Opened { token: HandleToken(7) })
        ));

        let sink = ImageSink {
            width: 32,
            height: 24,
        };
        camera.create_session(&handle, sink).unwrap();
        rx.try_recv().unwrap();

        let session = CaptureSession::new(handle.token(), sink);
        camera.capture(&session).unwrap();
        match rx.try_recv() {
            Ok(HardwareEvent::CaptureCompleted { result: Ok(image), .. }) => {
                assert_eq!((image.width, image.height), (32, 24));
                assert_eq!(&image.data[..2], &[0xFF, 0xD8]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_capture_after_close_is_refused() {
        let mut camera = VirtualCamera::new(VirtualCameraConfig::instant());
        let (tx, _rx) = unbounded_channel();
        let handle = CameraHandle::new(HandleToken(1), CameraId::new(FRONT_CAMERA_ID));
        camera.open(&handle, tx).unwrap();
        let session = CaptureSession::new(handle.token(), ImageSink { width: 2, height: 2 });
        camera.close(handle);

        assert_eq!(camera.capture(&session), Err(HardwareError::ResourceClosed));
    }
}
