// SPDX-License-Identifier: GPL-3.0-only

//! Camera resource lifecycle manager
//!
//! Owns the camera handle, the capture session and the image sink as one
//! state value, so a session without a handle can not be represented:
//!
//! ```text
//!  Closed ──open──▶ Opening ──Opened──▶ Configuring ──SessionConfigured──▶ Ready
//!    ▲                                                                    │  ▲
//!    │                                                        capture_one │  │ CaptureCompleted
//!    │                                                                    ▼  │
//!    └──── Closing ◀──close── (any state)                              Capturing
//!
//!  any open state ──Disconnected / Error / *Failed──▶ Faulted ──close──▶ Closed
//! ```
//!
//! The manager is not thread-safe on purpose. It lives inside the owner task
//! and backend callbacks reach it through [`handle_event`](CameraResourceManager::handle_event).

use super::CameraHardware;
use super::capabilities::{self, CapabilitySet};
use super::types::*;
use crate::errors::{HardwareError, HardwareResult, OrchestratorError, OrchestratorResult};
use crate::pipelines::interval::negotiation::negotiate;
use tracing::{debug, error, info, warn};

/// Device state with the resources each state owns
#[derive(Debug)]
enum DeviceState {
    Closed,
    Opening {
        handle: CameraHandle,
    },
    Configuring {
        handle: CameraHandle,
        sink: ImageSink,
    },
    Ready {
        handle: CameraHandle,
        session: CaptureSession,
    },
    Capturing {
        handle: CameraHandle,
        session: CaptureSession,
    },
    Faulted {
        error: HardwareError,
    },
}

impl DeviceState {
    fn state(&self) -> CameraState {
        match self {
            DeviceState::Closed => CameraState::Closed,
            DeviceState::Opening { .. } => CameraState::Opening,
            DeviceState::Configuring { .. } => CameraState::Configuring,
            DeviceState::Ready { .. } => CameraState::Ready,
            DeviceState::Capturing { .. } => CameraState::Capturing,
            DeviceState::Faulted { .. } => CameraState::Faulted,
        }
    }

    fn handle(&self) -> Option<&CameraHandle> {
        match self {
            DeviceState::Opening { handle }
            | DeviceState::Configuring { handle, .. }
            | DeviceState::Ready { handle, .. }
            | DeviceState::Capturing { handle, .. } => Some(handle),
            DeviceState::Closed | DeviceState::Faulted { .. } => None,
        }
    }
}

/// Outcome of a backend callback the owner has to act on
#[derive(Debug)]
pub enum ManagerNotice {
    /// Session configured, captures are possible now
    Ready,
    /// The outstanding capture request finished
    CaptureFinished(HardwareResult<CapturedImage>),
    /// The camera failed and its resources were released
    Faulted(HardwareError),
}

/// Camera resource manager
///
/// Drives one camera through the lifecycle state machine. Stale callbacks
/// (from a handle that has since been closed) are ignored.
pub struct CameraResourceManager {
    hardware: Box<dyn CameraHardware>,
    events: HardwareEventSender,
    device: DeviceState,
    next_token: u64,
    /// Capabilities of the open camera, dropped on every close
    capabilities: Option<CapabilitySet>,
    /// Last requested snapshot, pushed again after every open
    desired: CaptureSettings,
    /// Snapshot the device accepted last
    applied: Option<CaptureSettings>,
    /// State changes not yet collected by the owner
    transitions: Vec<CameraState>,
}

impl CameraResourceManager {
    /// Create a manager for a backend
    ///
    /// # Arguments
    /// * `hardware` - The backend to drive
    /// * `events` - Channel the backend posts its callbacks to
    /// * `desired` - Settings pushed once the camera is ready
    pub fn new(
        hardware: Box<dyn CameraHardware>,
        events: HardwareEventSender,
        desired: CaptureSettings,
    ) -> Self {
        Self {
            hardware,
            events,
            device: DeviceState::Closed,
            next_token: 1,
            capabilities: None,
            desired,
            applied: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> CameraState {
        self.device.state()
    }

    /// Camera the current handle belongs to
    pub fn camera_id(&self) -> Option<&CameraId> {
        self.device.handle().map(|handle| handle.camera())
    }

    pub fn desired_settings(&self) -> &CaptureSettings {
        &self.desired
    }

    pub fn applied_settings(&self) -> Option<&CaptureSettings> {
        self.applied.as_ref()
    }

    /// Remember a snapshot without pushing it (used before a reopen)
    pub fn set_desired(&mut self, settings: CaptureSettings) {
        self.desired = settings;
    }

    /// Drain the states entered since the last call
    pub fn take_transitions(&mut self) -> Vec<CameraState> {
        std::mem::take(&mut self.transitions)
    }

    pub fn enumerate_cameras(&self) -> HardwareResult<Vec<CameraDescriptor>> {
        self.hardware.enumerate_cameras()
    }

    /// Query a camera directly, bypassing the cache
    pub fn query_capabilities(&self, camera: &CameraId) -> HardwareResult<CapabilitySet> {
        capabilities::query(self.hardware.as_ref(), camera)
    }

    /// Capabilities of the open camera, queried once per open
    pub fn capabilities(&mut self) -> HardwareResult<CapabilitySet> {
        if let Some(caps) = &self.capabilities {
            return Ok(caps.clone());
        }
        let camera = self
            .device
            .handle()
            .map(|handle| handle.camera().clone())
            .ok_or(HardwareError::ResourceClosed)?;
        let caps = capabilities::query(self.hardware.as_ref(), &camera)?;
        self.capabilities = Some(caps.clone());
        Ok(caps)
    }

    /// Start opening a camera
    ///
    /// Only legal from `Closed`. If the backend refuses the request outright
    /// the manager stays `Closed`.
    pub fn open(&mut self, camera: CameraId) -> OrchestratorResult<()> {
        if !matches!(self.device, DeviceState::Closed) {
            return Err(OrchestratorError::NotReady(self.state()));
        }

        let token = HandleToken(self.next_token);
        self.next_token += 1;
        let handle = CameraHandle::new(token, camera);

        info!(camera = %handle.camera(), token = %token, "Opening camera");
        self.capabilities = None;
        self.hardware.open(&handle, self.events.clone())?;
        self.set_state(DeviceState::Opening { handle });
        Ok(())
    }

    /// Feed a backend callback into the state machine
    pub fn handle_event(&mut self, event: HardwareEvent) -> Option<ManagerNotice> {
        let token = event.token();
        if self.device.handle().map(|handle| handle.token()) != Some(token) {
            debug!(token = %token, state = %self.state(), "Ignoring stale camera event");
            return None;
        }

        match event {
            HardwareEvent::Opened { .. } => self.on_opened(),
            HardwareEvent::SessionConfigured { .. } => self.on_session_configured(),
            HardwareEvent::CaptureCompleted { result, .. } => self.on_capture_completed(result),
            HardwareEvent::OpenFailed { error, .. }
            | HardwareEvent::SessionFailed { error, .. }
            | HardwareEvent::Error { error, .. } => Some(self.fault(error)),
            HardwareEvent::Disconnected { .. } => Some(self.fault(HardwareError::Disconnected)),
        }
    }

    fn on_opened(&mut self) -> Option<ManagerNotice> {
        let handle = match std::mem::replace(&mut self.device, DeviceState::Closed) {
            DeviceState::Opening { handle } => handle,
            other => {
                self.device = other;
                return None;
            }
        };

        // Fresh open: capabilities may differ from the previous camera
        let caps = match capabilities::query(self.hardware.as_ref(), handle.camera()) {
            Ok(caps) => caps,
            Err(e) => {
                self.device = DeviceState::Opening { handle };
                return Some(self.fault(e));
            }
        };
        let sink = ImageSink {
            width: caps.still_resolution.0,
            height: caps.still_resolution.1,
        };
        self.capabilities = Some(caps);

        match self.hardware.create_session(&handle, sink) {
            Ok(()) => {
                debug!(camera = %handle.camera(), sink = %sink, "Configuring capture session");
                self.set_state(DeviceState::Configuring { handle, sink });
                None
            }
            Err(e) => {
                self.device = DeviceState::Opening { handle };
                Some(self.fault(e))
            }
        }
    }

    fn on_session_configured(&mut self) -> Option<ManagerNotice> {
        let (handle, sink) = match std::mem::replace(&mut self.device, DeviceState::Closed) {
            DeviceState::Configuring { handle, sink } => (handle, sink),
            other => {
                self.device = other;
                return None;
            }
        };

        let session = CaptureSession::new(handle.token(), sink);
        info!(camera = %handle.camera(), sink = %sink, "Camera ready");
        self.set_state(DeviceState::Ready { handle, session });

        let desired = self.desired;
        if let Err(e) = self.apply_settings(desired) {
            warn!(error = %e, "Failed to apply capture settings after open");
        }
        Some(ManagerNotice::Ready)
    }

    fn on_capture_completed(
        &mut self,
        result: HardwareResult<CapturedImage>,
    ) -> Option<ManagerNotice> {
        match std::mem::replace(&mut self.device, DeviceState::Closed) {
            DeviceState::Capturing { handle, session } => {
                self.set_state(DeviceState::Ready { handle, session });
                Some(ManagerNotice::CaptureFinished(result))
            }
            other => {
                debug!(state = %other.state(), "Capture completion without request");
                self.device = other;
                None
            }
        }
    }

    /// Release everything and park in `Faulted`
    fn fault(&mut self, error: HardwareError) -> ManagerNotice {
        error!(error = %error, state = %self.state(), "Camera fault");
        let previous = std::mem::replace(&mut self.device, DeviceState::Closed);
        self.release(previous);
        self.set_state(DeviceState::Faulted {
            error: error.clone(),
        });
        ManagerNotice::Faulted(error)
    }

    /// Release a state's resources, session before device
    fn release(&mut self, state: DeviceState) {
        match state {
            DeviceState::Ready { handle, session } | DeviceState::Capturing { handle, session } => {
                self.hardware.release_session(session);
                self.hardware.close(handle);
            }
            DeviceState::Opening { handle } | DeviceState::Configuring { handle, .. } => {
                self.hardware.close(handle);
            }
            DeviceState::Closed | DeviceState::Faulted { .. } => {}
        }
        self.capabilities = None;
        self.applied = None;
    }

    /// Issue one capture request
    ///
    /// Only legal from `Ready`. In any other state this fails with
    /// `NotReady` and the backend is not called.
    pub fn capture_one(&mut self) -> OrchestratorResult<()> {
        match std::mem::replace(&mut self.device, DeviceState::Closed) {
            DeviceState::Ready { handle, session } => match self.hardware.capture(&session) {
                Ok(()) => {
                    self.set_state(DeviceState::Capturing { handle, session });
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Capture request refused");
                    self.device = DeviceState::Ready { handle, session };
                    Err(e.into())
                }
            },
            other => {
                let state = other.state();
                self.device = other;
                Err(OrchestratorError::NotReady(state))
            }
        }
    }

    /// Negotiate and push a settings snapshot
    ///
    /// The snapshot is remembered either way and pushed again after the next
    /// open. Pushing is only possible in `Ready` and `Capturing`.
    ///
    /// # Returns
    /// The negotiated snapshot the device accepted
    pub fn apply_settings(
        &mut self,
        requested: CaptureSettings,
    ) -> OrchestratorResult<CaptureSettings> {
        self.desired = requested;

        let state = self.state();
        if !matches!(state, CameraState::Ready | CameraState::Capturing) {
            return Err(OrchestratorError::NotReady(state));
        }

        let caps = self.capabilities()?;
        let negotiated = negotiate(&requested, &caps);

        let handle = match &self.device {
            DeviceState::Ready { handle, .. } | DeviceState::Capturing { handle, .. } => handle,
            _ => return Err(OrchestratorError::NotReady(state)),
        };
        self.hardware.apply_settings(handle, &negotiated)?;

        info!(settings = %negotiated, "Applied capture settings");
        self.applied = Some(negotiated);
        Ok(negotiated)
    }

    /// Close the camera from any state
    ///
    /// Releases the session before the device. Closing a closed manager is a
    /// no-op.
    pub fn close(&mut self) {
        let previous = std::mem::replace(&mut self.device, DeviceState::Closed);
        if matches!(previous, DeviceState::Closed) {
            return;
        }

        info!(state = %previous.state(), "Closing camera");
        self.log_transition(previous.state(), CameraState::Closing);
        self.transitions.push(CameraState::Closing);
        self.release(previous);
        self.log_transition(CameraState::Closing, CameraState::Closed);
        self.transitions.push(CameraState::Closed);
    }

    fn set_state(&mut self, next: DeviceState) {
        let from = self.device.state();
        let to = next.state();
        self.device = next;
        self.log_transition(from, to);
        self.transitions.push(to);
    }

    fn log_transition(&self, from: CameraState, to: CameraState) {
        debug!(from = %from, to = %to, "Camera state transition");
    }
}
