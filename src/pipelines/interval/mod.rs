// SPDX-License-Identifier: MPL-2.0

//! Interval capture
//!
//! Takes a fixed number of stills at a fixed interval and hands each one to
//! a [`PhotoStore`] without waiting for it to be written.
//!
//! ```text
//!  IntervalCamera ──Command──▶ ┌──────────────────────────────┐
//!    (any task)   ◀──reply──── │ owner task                   │
//!                              │  ScheduleState               │──▶ ScheduleEvent
//!  backend ──HardwareEvent───▶ │  CameraResourceManager       │
//!  timers ───Tick/Grace──────▶ │                              │──▶ PhotoStore (blocking pool)
//!                              └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), interval_camera::errors::OrchestratorError> {
//! use interval_camera::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
//! use interval_camera::pipelines::interval::{IntervalCamera, OrchestratorOptions};
//! use interval_camera::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let hardware = Box::new(VirtualCamera::new(VirtualCameraConfig::default()));
//! let (camera, mut events) = IntervalCamera::spawn(
//!     hardware,
//!     Arc::new(MemoryStore::new()),
//!     OrchestratorOptions::default(),
//! );
//! camera.start(5, 10).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod negotiation;
mod orchestrator;
pub mod schedule;

pub use negotiation::{negotiate, requires_reopen};
pub use schedule::{ScheduleOutcome, ScheduleState, ScheduleSummary, format_elapsed};

use crate::backends::camera::{
    CameraHardware, CameraId, CameraResourceManager, CameraState, CapabilitySet, CaptureSettings,
};
use crate::constants::{CAMERA_GRACE_DELAY, COMMAND_QUEUE_DEPTH};
use crate::errors::{OrchestratorError, OrchestratorResult, StorageError};
use crate::storage::PhotoStore;
use futures::channel::oneshot;
use orchestrator::{Command, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Tuning of the owner task
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// How long `start` waits for a camera that is not ready yet
    pub grace_delay: Duration,
    /// Camera to prefer when its facing matches the requested lens
    pub camera_id: Option<CameraId>,
    /// Settings pushed on the first open
    pub initial_settings: CaptureSettings,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            grace_delay: CAMERA_GRACE_DELAY,
            camera_id: None,
            initial_settings: CaptureSettings::default(),
        }
    }
}

/// Snapshot of the running (or last finished) schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub shots_taken: u32,
    pub total_shots: u32,
    pub attempts: u32,
    pub running: bool,
    pub elapsed_label: String,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            shots_taken: 0,
            total_shots: 0,
            attempts: 0,
            running: false,
            elapsed_label: format_elapsed(Duration::ZERO),
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} shots, {}",
            self.shots_taken, self.total_shots, self.elapsed_label
        )
    }
}

/// Notifications from the owner task
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleEvent {
    Started {
        interval_seconds: u32,
        total_shots: u32,
    },
    ShotCaptured {
        shot: u32,
        image_name: String,
    },
    /// A capture attempt produced no image; the schedule goes on
    ShotFailed {
        attempt: u32,
        error: OrchestratorError,
    },
    ImageSaved {
        shot: u32,
        location: String,
    },
    SaveFailed {
        shot: u32,
        error: StorageError,
    },
    CameraStateChanged(CameraState),
    /// Sent exactly once per schedule that started
    Finished(ScheduleSummary),
}

impl std::fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleEvent::Started {
                interval_seconds,
                total_shots,
            } => write!(
                f,
                "started: {} shots every {}s",
                total_shots, interval_seconds
            ),
            ScheduleEvent::ShotCaptured { shot, image_name } => {
                write!(f, "shot {} captured ({})", shot, image_name)
            }
            ScheduleEvent::ShotFailed { attempt, error } => {
                write!(f, "attempt {} failed: {}", attempt, error)
            }
            ScheduleEvent::ImageSaved { shot, location } => {
                write!(f, "shot {} saved to {}", shot, location)
            }
            ScheduleEvent::SaveFailed { shot, error } => {
                write!(f, "shot {} not saved: {}", shot, error)
            }
            ScheduleEvent::CameraStateChanged(state) => write!(f, "camera {}", state),
            ScheduleEvent::Finished(summary) => write!(f, "{}", summary),
        }
    }
}

/// Control handle of an interval capture owner task
///
/// Cheap to clone. Once the owner task is gone every call fails with
/// [`OrchestratorError::Shutdown`] (or returns `None`).
#[derive(Debug, Clone)]
pub struct IntervalCamera {
    commands: mpsc::Sender<Command>,
}

impl IntervalCamera {
    /// Spawn the owner task on the current tokio runtime
    ///
    /// # Arguments
    /// * `hardware` - Camera backend, owned by the task from now on
    /// * `store` - Where captured images go
    /// * `options` - Grace delay, preferred camera and initial settings
    ///
    /// # Returns
    /// The control handle and the event stream
    pub fn spawn(
        hardware: Box<dyn CameraHardware>,
        store: Arc<dyn PhotoStore>,
        options: OrchestratorOptions,
    ) -> (Self, UnboundedReceiver<ScheduleEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (hardware_tx, hardware_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = CameraResourceManager::new(hardware, hardware_tx, options.initial_settings);
        let orchestrator = Orchestrator::new(manager, store, event_tx, timer_tx, options);
        tokio::spawn(orchestrator.run(command_rx, hardware_rx, timer_rx));

        (
            Self {
                commands: command_tx,
            },
            event_rx,
        )
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> OrchestratorResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| OrchestratorError::Shutdown)?;
        response.await.map_err(|_| OrchestratorError::Shutdown)
    }

    /// Start a schedule of `total_shots` captures, `interval_seconds` apart
    ///
    /// A running schedule is stopped first. If the camera is not ready the
    /// camera is opened and the call resolves after the grace delay, with
    /// [`OrchestratorError::CameraNotReady`] if it still is not ready.
    pub async fn start(&self, interval_seconds: u32, total_shots: u32) -> OrchestratorResult<()> {
        self.call(|reply| Command::Start {
            interval_seconds,
            total_shots,
            reply,
        })
        .await?
    }

    /// Stop the running schedule; `None` when nothing was running
    pub async fn stop(&self) -> Option<ScheduleSummary> {
        self.call(|reply| Command::Stop { force: false, reply })
            .await
            .ok()
            .flatten()
    }

    /// Like [`stop`](Self::stop), reported as a forced stop
    pub async fn force_stop(&self) -> Option<ScheduleSummary> {
        self.call(|reply| Command::Stop { force: true, reply })
            .await
            .ok()
            .flatten()
    }

    /// Negotiate and apply capture settings
    ///
    /// # Returns
    /// * `Ok(settings)` - The negotiated snapshot, or the requested one when
    ///   a lens change reopened the camera
    /// * `Err(NotReady)` - No open camera; the request is kept for the next open
    pub async fn apply_settings(
        &self,
        settings: CaptureSettings,
    ) -> OrchestratorResult<CaptureSettings> {
        self.call(|reply| Command::ApplySettings { settings, reply })
            .await?
    }

    pub async fn progress(&self) -> OrchestratorResult<Progress> {
        self.call(|reply| Command::Progress { reply }).await
    }

    pub async fn capabilities(&self) -> OrchestratorResult<CapabilitySet> {
        self.call(|reply| Command::Capabilities { reply }).await?
    }

    /// Open the camera for the desired lens without starting a schedule
    pub async fn open_camera(&self) -> OrchestratorResult<()> {
        self.call(|reply| Command::OpenCamera { reply }).await?
    }

    pub async fn camera_state(&self) -> OrchestratorResult<CameraState> {
        self.call(|reply| Command::CameraState { reply }).await
    }

    /// Host went to the background: stop and release the camera
    pub async fn pause(&self) -> Option<ScheduleSummary> {
        self.call(|reply| Command::Pause { reply })
            .await
            .ok()
            .flatten()
    }

    /// Host came back: reopen the camera
    pub async fn resume(&self) -> OrchestratorResult<()> {
        self.open_camera().await
    }

    /// Stop, close the camera and end the owner task
    pub async fn shutdown(&self) -> Option<ScheduleSummary> {
        self.call(|reply| Command::Shutdown { reply })
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
    use crate::storage::MemoryStore;

    fn spawn_instant() -> (IntervalCamera, UnboundedReceiver<ScheduleEvent>) {
        IntervalCamera::spawn(
            Box::new(VirtualCamera::new(VirtualCameraConfig::instant())),
            Arc::new(MemoryStore::new()),
            OrchestratorOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_when_idle() {
        let (camera, _events) = spawn_instant();
        let progress = camera.progress().await.unwrap();
        assert_eq!(progress, Progress::default());
        assert_eq!(progress.elapsed_label, "0s");
        assert_eq!(camera.stop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_shutdown() {
        let (camera, _events) = spawn_instant();
        assert_eq!(camera.shutdown().await, None);
        assert_eq!(
            camera.progress().await,
            Err(OrchestratorError::Shutdown)
        );
        assert_eq!(camera.stop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let (camera, _events) = spawn_instant();
        camera.open_camera().await.unwrap();
        assert_eq!(camera.camera_state().await, Ok(CameraState::Ready));

        camera.start(5, 3).await.unwrap();
        let summary = camera.pause().await.unwrap();
        assert_eq!(summary.outcome, ScheduleOutcome::Stopped);
        assert_eq!(camera.camera_state().await, Ok(CameraState::Closed));

        camera.resume().await.unwrap();
        assert_eq!(camera.camera_state().await, Ok(CameraState::Ready));
    }

    #[test]
    fn test_event_display() {
        let event = ScheduleEvent::ShotCaptured {
            shot: 2,
            image_name: "2024-05-01-13-45-10-123.jpg".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "shot 2 captured (2024-05-01-13-45-10-123.jpg)"
        );
    }
}
