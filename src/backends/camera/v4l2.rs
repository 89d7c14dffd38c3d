// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 still capture backend
//!
//! Every opened device gets a worker thread that owns the file descriptor
//! and performs the blocking work (open, format negotiation, streaming).
//! Results go back to the owner task as [`HardwareEvent`]s. Control writes
//! are short ioctls and are issued directly on the device node.
//!
//! Devices do not report which way they face, so every camera is listed as
//! [`LensFacing::Back`].

use super::CameraHardware;
use super::capabilities::CapabilitySet;
use super::types::*;
use super::v4l2_controls::{self, DeviceControls};
use crate::constants::{V4L2_BUFFER_COUNT, V4L2_WARMUP_FRAMES};
use crate::errors::{HardwareError, HardwareResult};
use crate::pipelines::photo::{EncodingQuality, PostProcessingConfig, render_yuyv_still};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Resolution assumed when a device does not enumerate frame sizes
const FALLBACK_RESOLUTION: (u32, u32) = (640, 480);

/// Pixel formats the backend can turn into a JPEG, in order of preference
const MJPG: &[u8; 4] = b"MJPG";
const YUYV: &[u8; 4] = b"YUYV";

/// Work sent to a device thread
enum WorkerCommand {
    Configure(ImageSink),
    Capture,
    Shutdown,
}

/// Handle to the thread owning one opened device
struct DeviceWorker {
    path: String,
    commands: Sender<WorkerCommand>,
    controls: DeviceControls,
}

impl DeviceWorker {
    fn send(&self, command: WorkerCommand) -> HardwareResult<()> {
        self.commands
            .send(command)
            .map_err(|_| HardwareError::ResourceClosed)
    }
}

/// V4L2 camera backend
pub struct V4l2Camera {
    workers: HashMap<HandleToken, DeviceWorker>,
}

impl V4l2Camera {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    fn worker(&self, token: HandleToken) -> HardwareResult<&DeviceWorker> {
        self.workers
            .get(&token)
            .ok_or(HardwareError::ResourceClosed)
    }
}

impl Default for V4l2Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan /dev/video* for nodes with the video capture capability
fn scan_devices() -> HardwareResult<Vec<CameraDescriptor>> {
    let entries = std::fs::read_dir("/dev")
        .map_err(|e| HardwareError::Unavailable(format!("cannot read /dev: {}", e)))?;

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut cameras = Vec::new();
    for path in paths {
        let path_str = path.to_string_lossy().to_string();
        let Ok(dev) = Device::with_path(&path) else {
            debug!(path = %path_str, "Skipping device that cannot be opened");
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }
        // Metadata nodes advertise capture but list no pixel formats
        if dev.enum_formats().map(|f| f.is_empty()).unwrap_or(true) {
            continue;
        }

        debug!(path = %path_str, card = %caps.card, driver = %caps.driver, "Found V4L2 camera");
        cameras.push(CameraDescriptor {
            id: CameraId::new(path_str),
            facing: LensFacing::Back,
            name: caps.card,
        });
    }

    Ok(cameras)
}

/// Largest discrete frame size of the preferred pixel format
fn largest_frame_size(dev: &Device) -> Option<(u32, u32)> {
    let formats = dev.enum_formats().ok()?;
    let fourcc = [MJPG, YUYV]
        .into_iter()
        .map(FourCC::new)
        .find(|fourcc| formats.iter().any(|f| f.fourcc == *fourcc))?;

    dev.enum_framesizes(fourcc)
        .ok()?
        .into_iter()
        .filter_map(|size| match size.size {
            FrameSizeEnum::Discrete(d) => Some((d.width, d.height)),
            FrameSizeEnum::Stepwise(s) => Some((s.max_width, s.max_height)),
        })
        .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h))
}

/// Worker thread body: open, then serve commands until shutdown
fn run_worker(
    path: String,
    token: HandleToken,
    events: HardwareEventSender,
    commands: Receiver<WorkerCommand>,
) {
    let dev = match Device::with_path(&path) {
        Ok(dev) => dev,
        Err(e) => {
            warn!(path = %path, error = %e, "Failed to open V4L2 device");
            let _ = events.send(HardwareEvent::OpenFailed {
                token,
                error: HardwareError::OpenFailed(format!("{}: {}", path, e)),
            });
            return;
        }
    };
    info!(path = %path, "V4L2 device opened");
    if events.send(HardwareEvent::Opened { token }).is_err() {
        return;
    }

    let mut format: Option<Format> = None;

    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Configure(sink) => match configure(&dev, sink) {
                Ok(accepted) => {
                    format = Some(accepted);
                    let _ = events.send(HardwareEvent::SessionConfigured { token });
                }
                Err(error) => {
                    let _ = events.send(HardwareEvent::SessionFailed { token, error });
                }
            },
            WorkerCommand::Capture => {
                let event = match format.as_ref() {
                    None => HardwareEvent::CaptureCompleted {
                        token,
                        result: Err(HardwareError::CaptureFailed(
                            "session not configured".to_string(),
                        )),
                    },
                    Some(format) => match capture_still(&dev, format) {
                        Err(HardwareError::Disconnected) => HardwareEvent::Disconnected { token },
                        result => HardwareEvent::CaptureCompleted { token, result },
                    },
                };
                let _ = events.send(event);
            }
            WorkerCommand::Shutdown => break,
        }
    }

    debug!(path = %path, "V4L2 worker stopped");
}

/// Set the capture format, MJPG first and YUYV as fallback
fn configure(dev: &Device, sink: ImageSink) -> HardwareResult<Format> {
    let mut last_error = None;

    for fourcc in [MJPG, YUYV].map(FourCC::new) {
        let requested = Format::new(sink.width, sink.height, fourcc);
        match dev.set_format(&requested) {
            Ok(actual) if actual.fourcc == fourcc => {
                info!(
                    width = actual.width,
                    height = actual.height,
                    fourcc = %actual.fourcc,
                    "Set V4L2 format"
                );
                return Ok(actual);
            }
            Ok(actual) => {
                debug!(requested = %fourcc, got = %actual.fourcc, "Format not accepted");
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => HardwareError::from(e),
        None => HardwareError::ConfigureFailed("no MJPG or YUYV support".to_string()),
    })
}

/// Stream a few frames so exposure settles, keep the last one
fn capture_still(dev: &Device, format: &Format) -> HardwareResult<CapturedImage> {
    let mut stream = MmapStream::with_buffers(dev, Type::VideoCapture, V4L2_BUFFER_COUNT)?;

    for _ in 0..V4L2_WARMUP_FRAMES {
        stream.next()?;
    }
    let (buf, meta) = stream.next()?;
    let used = (meta.bytesused as usize).min(buf.len());
    let frame = &buf[..used];
    let captured_at = Local::now();

    let data = if format.fourcc == FourCC::new(MJPG) {
        frame.to_vec()
    } else {
        // Controls already carry the settings, so no software effects here
        render_yuyv_still(
            frame,
            format.width,
            format.height,
            PostProcessingConfig::default(),
            EncodingQuality::High,
        )
        .map_err(HardwareError::CaptureFailed)?
    };

    if data.is_empty() {
        return Err(HardwareError::CaptureFailed("empty frame".to_string()));
    }

    Ok(CapturedImage {
        data: Arc::from(data.into_boxed_slice()),
        width: format.width,
        height: format.height,
        captured_at,
    })
}

impl CameraHardware for V4l2Camera {
    fn enumerate_cameras(&self) -> HardwareResult<Vec<CameraDescriptor>> {
        scan_devices()
    }

    fn query_capabilities(&self, camera: &CameraId) -> HardwareResult<CapabilitySet> {
        let path = camera.as_str();
        let dev = Device::with_path(path)
            .map_err(|e| HardwareError::Unavailable(format!("{}: {}", path, e)))?;

        let resolution = largest_frame_size(&dev).unwrap_or(FALLBACK_RESOLUTION);
        let controls = match self.workers.values().find(|w| w.path == path) {
            Some(worker) => worker.controls.clone(),
            None => DeviceControls::probe(path),
        };

        Ok(CapabilitySet {
            focus_modes: controls.focus_modes(),
            white_balance_modes: controls.white_balance_modes(),
            zoom: controls.zoom_range(),
            exposure: controls.exposure_range(),
            ..CapabilitySet::minimal(camera.clone(), LensFacing::Back, resolution)
        })
    }

    fn open(&mut self, handle: &CameraHandle, events: HardwareEventSender) -> HardwareResult<()> {
        let path = handle.camera().as_str().to_string();
        if !std::path::Path::new(&path).exists() {
            return Err(HardwareError::Unavailable(format!("{} does not exist", path)));
        }

        let token = handle.token();
        let (commands, receiver) = mpsc::channel();
        let thread_path = path.clone();
        // Detached: the thread exits after Shutdown or when the sender drops
        std::thread::Builder::new()
            .name(format!("v4l2-{}", token))
            .spawn(move || run_worker(thread_path, token, events, receiver))
            .map_err(|e| HardwareError::OpenFailed(e.to_string()))?;

        self.workers.insert(
            token,
            DeviceWorker {
                controls: DeviceControls::probe(&path),
                path,
                commands,
            },
        );
        Ok(())
    }

    fn create_session(&mut self, handle: &CameraHandle, sink: ImageSink) -> HardwareResult<()> {
        self.worker(handle.token())?
            .send(WorkerCommand::Configure(sink))
    }

    fn apply_settings(
        &mut self,
        handle: &CameraHandle,
        settings: &CaptureSettings,
    ) -> HardwareResult<()> {
        let worker = self.worker(handle.token())?;
        let values = worker.controls.control_values(settings);
        debug!(path = %worker.path, count = values.len(), "Writing V4L2 controls");
        v4l2_controls::apply_controls(&worker.path, &values)
    }

    fn capture(&mut self, session: &CaptureSession) -> HardwareResult<()> {
        self.worker(session.token())?.send(WorkerCommand::Capture)
    }

    fn release_session(&mut self, session: CaptureSession) {
        // Streams only live for one capture, nothing stays allocated
        debug!(token = %session.token(), "V4L2 session released");
    }

    fn close(&mut self, handle: CameraHandle) {
        let Some(worker) = self.workers.remove(&handle.token()) else {
            return;
        };
        let _ = worker.send(WorkerCommand::Shutdown);
        info!(path = %worker.path, "V4L2 device closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_open_missing_device_is_refused() {
        let mut camera = V4l2Camera::new();
        let (tx, _rx) = unbounded_channel();
        let handle = CameraHandle::new(HandleToken(1), CameraId::new("/dev/video-does-not-exist"));
        assert!(matches!(
            camera.open(&handle, tx),
            Err(HardwareError::Unavailable(_))
        ));
    }

    #[test]
    fn test_requests_on_unknown_handle() {
        let mut camera = V4l2Camera::new();
        let handle = CameraHandle::new(HandleToken(3), CameraId::new("/dev/video0"));
        let sink = ImageSink {
            width: 640,
            height: 480,
        };
        assert_eq!(
            camera.create_session(&handle, sink),
            Err(HardwareError::ResourceClosed)
        );
        let session = CaptureSession::new(HandleToken(3), sink);
        assert_eq!(camera.capture(&session), Err(HardwareError::ResourceClosed));
        camera.close(handle);
    }
}
