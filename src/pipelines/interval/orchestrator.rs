// SPDX-License-Identifier: GPL-3.0-only

//! Owner task of the interval capture
//!
//! One tokio task owns the [`CameraResourceManager`], the live schedule and
//! every timer. Commands from [`IntervalCamera`](super::IntervalCamera),
//! hardware callbacks and timer expiries all arrive as messages on channels
//! and are handled one at a time, so nothing here needs a lock.
//!
//! Timers are plain tasks that sleep and then post a message tagged with the
//! schedule generation. A message from an older generation is dropped, which
//! makes cancellation race-free: stopping aborts the timer task, and a tick
//! that was already posted finds the schedule gone.

use super::negotiation::requires_reopen;
use super::schedule::{self, ScheduleOutcome, ScheduleState, ScheduleSummary, format_elapsed};
use super::{OrchestratorOptions, Progress, ScheduleEvent};
use crate::backends::camera::{
    CameraId, CameraResourceManager, CameraState, CapabilitySet, CaptureSettings, CapturedImage,
    HardwareEvent, ManagerNotice, select_camera,
};
use crate::errors::{HardwareError, OrchestratorError, OrchestratorResult};
use crate::pipelines::photo::capture_file_name;
use crate::storage::{self, PhotoStore};
use futures::channel::oneshot;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Requests from the control handle
pub(crate) enum Command {
    Start {
        interval_seconds: u32,
        total_shots: u32,
        reply: oneshot::Sender<OrchestratorResult<()>>,
    },
    Stop {
        force: bool,
        reply: oneshot::Sender<Option<ScheduleSummary>>,
    },
    ApplySettings {
        settings: CaptureSettings,
        reply: oneshot::Sender<OrchestratorResult<CaptureSettings>>,
    },
    Progress {
        reply: oneshot::Sender<Progress>,
    },
    Capabilities {
        reply: oneshot::Sender<OrchestratorResult<CapabilitySet>>,
    },
    OpenCamera {
        reply: oneshot::Sender<OrchestratorResult<()>>,
    },
    CameraState {
        reply: oneshot::Sender<CameraState>,
    },
    Pause {
        reply: oneshot::Sender<Option<ScheduleSummary>>,
    },
    Shutdown {
        reply: oneshot::Sender<Option<ScheduleSummary>>,
    },
}

/// Timer expiries posted back to the owner task
#[derive(Debug)]
pub(crate) enum TimerMessage {
    Tick { generation: u64 },
    GraceExpired { generation: u64 },
}

/// A start request waiting for the camera to become ready
struct PendingStart {
    generation: u64,
    interval_seconds: u32,
    total_shots: u32,
    reply: oneshot::Sender<OrchestratorResult<()>>,
    timer: JoinHandle<()>,
}

pub(crate) struct Orchestrator {
    manager: CameraResourceManager,
    store: Arc<dyn PhotoStore>,
    events: UnboundedSender<ScheduleEvent>,
    timers: UnboundedSender<TimerMessage>,
    options: OrchestratorOptions,
    /// Bumped by every start; stale timer messages carry an older value
    generation: u64,
    schedule: Option<ScheduleState>,
    tick_timer: Option<JoinHandle<()>>,
    pending_start: Option<PendingStart>,
    /// Generation of the schedule that issued the outstanding capture
    in_flight: Option<u64>,
    /// Tick that fired while a capture was still outstanding
    parked_tick: Option<u64>,
    last_summary: Option<ScheduleSummary>,
}

impl Orchestrator {
    pub(crate) fn new(
        manager: CameraResourceManager,
        store: Arc<dyn PhotoStore>,
        events: UnboundedSender<ScheduleEvent>,
        timers: UnboundedSender<TimerMessage>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            manager,
            store,
            events,
            timers,
            options,
            generation: 0,
            schedule: None,
            tick_timer: None,
            pending_start: None,
            in_flight: None,
            parked_tick: None,
            last_summary: None,
        }
    }

    /// Serve messages until shutdown or until every handle is dropped
    pub(crate) async fn run(
        mut self,
        mut commands: Receiver<Command>,
        mut hardware: UnboundedReceiver<HardwareEvent>,
        mut timers: UnboundedReceiver<TimerMessage>,
    ) {
        info!("Interval capture task started");

        loop {
            // A queued command is served before a queued timer expiry, so a
            // stop that is already waiting always wins over the next tick
            let flow = tokio::select! {
                biased;

                Some(event) = hardware.recv() => {
                    self.on_hardware_event(event);
                    ControlFlow::Continue(())
                }
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        self.shutdown();
                        ControlFlow::Break(())
                    }
                },
                Some(message) = timers.recv() => {
                    self.on_timer(message);
                    ControlFlow::Continue(())
                }
            };
            self.flush_transitions();
            if flow.is_break() {
                break;
            }
        }

        info!("Interval capture task stopped");
    }

    /// Serve one command; breaks after shutdown
    fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start {
                interval_seconds,
                total_shots,
                reply,
            } => self.start(interval_seconds, total_shots, reply),
            Command::Stop { force, reply } => {
                let _ = reply.send(self.stop(force));
            }
            Command::ApplySettings { settings, reply } => {
                let _ = reply.send(self.apply_settings(settings));
            }
            Command::Progress { reply } => {
                let _ = reply.send(self.progress());
            }
            Command::Capabilities { reply } => {
                let _ = reply.send(self.capabilities());
            }
            Command::OpenCamera { reply } => {
                let _ = reply.send(self.open_camera());
            }
            Command::CameraState { reply } => {
                let _ = reply.send(self.manager.state());
            }
            Command::Pause { reply } => {
                let summary = self.stop(false);
                self.close_camera();
                let _ = reply.send(summary);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.shutdown());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ===== Schedule =====

    fn start(
        &mut self,
        interval_seconds: u32,
        total_shots: u32,
        reply: oneshot::Sender<OrchestratorResult<()>>,
    ) {
        if let Err(e) = schedule::validate(interval_seconds, total_shots) {
            warn!(error = %e, "Rejected start request");
            let _ = reply.send(Err(e));
            return;
        }

        // Last caller wins
        self.cancel_pending_start();
        self.finish_schedule(ScheduleOutcome::Stopped);
        self.last_summary = None;
        self.generation += 1;

        let state = self.manager.state();
        if matches!(state, CameraState::Ready | CameraState::Capturing) {
            self.begin_schedule(interval_seconds, total_shots);
            let _ = reply.send(Ok(()));
            return;
        }

        if state == CameraState::Faulted {
            self.close_camera();
        }
        if self.manager.state() == CameraState::Closed
            && let Err(e) = self.open_selected()
        {
            warn!(error = %e, "Could not open camera for interval capture");
            let _ = reply.send(Err(e));
            return;
        }

        let generation = self.generation;
        info!(
            grace_ms = self.options.grace_delay.as_millis() as u64,
            state = %self.manager.state(),
            "Waiting for camera before first capture"
        );
        let timer = self.spawn_timer(
            Instant::now() + self.options.grace_delay,
            TimerMessage::GraceExpired { generation },
        );
        self.pending_start = Some(PendingStart {
            generation,
            interval_seconds,
            total_shots,
            reply,
            timer,
        });
    }

    fn on_grace_expired(&mut self, generation: u64) {
        let Some(pending) = self
            .pending_start
            .take_if(|pending| pending.generation == generation)
        else {
            return;
        };

        let state = self.manager.state();
        if matches!(state, CameraState::Ready | CameraState::Capturing) {
            self.begin_schedule(pending.interval_seconds, pending.total_shots);
            let _ = pending.reply.send(Ok(()));
        } else {
            warn!(state = %state, "Camera not ready after grace delay");
            let _ = pending.reply.send(Err(OrchestratorError::CameraNotReady));
        }
    }

    fn cancel_pending_start(&mut self) {
        if let Some(pending) = self.pending_start.take() {
            debug!(generation = pending.generation, "Cancelling pending start");
            pending.timer.abort();
            let _ = pending.reply.send(Err(OrchestratorError::Cancelled));
        }
    }

    fn begin_schedule(&mut self, interval_seconds: u32, total_shots: u32) {
        info!(interval_seconds, total_shots, "Interval capture started");
        self.schedule = Some(ScheduleState::new(
            interval_seconds,
            total_shots,
            Instant::now(),
        ));
        self.emit(ScheduleEvent::Started {
            interval_seconds,
            total_shots,
        });
        self.tick(self.generation);
    }

    fn tick(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        let Some(schedule) = self.schedule.as_mut() else {
            return;
        };
        self.tick_timer = None;

        if schedule.is_exhausted() {
            self.finish_schedule(ScheduleOutcome::Completed);
            return;
        }
        if self.in_flight.is_some() {
            debug!("Previous capture still outstanding, parking tick");
            self.parked_tick = Some(generation);
            return;
        }

        schedule.record_attempt();
        let attempt = schedule.attempts;
        match self.manager.capture_one() {
            Ok(()) => {
                debug!(attempt, "Capture requested");
                self.in_flight = Some(generation);
            }
            Err(e) => {
                warn!(attempt, error = %e, "Capture attempt failed");
                self.emit(ScheduleEvent::ShotFailed { attempt, error: e });
                self.after_shot();
            }
        }
    }

    /// Schedule the next tick or complete the schedule
    fn after_shot(&mut self) {
        let Some(schedule) = &self.schedule else {
            return;
        };
        if schedule.is_exhausted() {
            self.finish_schedule(ScheduleOutcome::Completed);
            return;
        }

        // Ticks stay anchored to the start time; a slow capture fires the
        // next tick immediately instead of shifting the whole sequence
        let deadline = schedule.started_at + schedule.interval() * schedule.attempts;
        let generation = self.generation;
        self.tick_timer = Some(self.spawn_timer(deadline, TimerMessage::Tick { generation }));
    }

    fn on_capture_finished(&mut self, result: Result<CapturedImage, HardwareError>) {
        let current = self.in_flight.take() == Some(self.generation);

        if let Some(schedule) = self.schedule.as_mut().filter(|_| current) {
            match result {
                Ok(image) => {
                    schedule.record_success();
                    let shot = schedule.shots_taken;
                    let total = schedule.total_shots;
                    let image_name = capture_file_name(image.captured_at);
                    info!(shot, total, name = %image_name, "Shot captured");
                    self.emit(ScheduleEvent::ShotCaptured {
                        shot,
                        image_name: image_name.clone(),
                    });
                    self.persist(shot, image, image_name);
                }
                Err(e) => {
                    let attempt = schedule.attempts;
                    warn!(attempt, error = %e, "Capture failed, continuing schedule");
                    self.emit(ScheduleEvent::ShotFailed {
                        attempt,
                        error: e.into(),
                    });
                }
            }
            self.after_shot();
        } else {
            debug!("Discarding capture result of a finished schedule");
        }

        if let Some(generation) = self.parked_tick.take() {
            self.tick(generation);
        }
    }

    /// Forget the outstanding capture after the camera went away under it
    fn abandon_capture(&mut self, error: OrchestratorError) {
        let Some(issued_by) = self.in_flight.take() else {
            return;
        };
        if issued_by == self.generation
            && let Some(schedule) = &self.schedule
        {
            let attempt = schedule.attempts;
            warn!(attempt, error = %error, "Outstanding capture abandoned");
            self.emit(ScheduleEvent::ShotFailed { attempt, error });
            self.after_shot();
        }
        if let Some(generation) = self.parked_tick.take() {
            self.tick(generation);
        }
    }

    /// End the live schedule, if any, with exactly one `Finished` event
    fn finish_schedule(&mut self, outcome: ScheduleOutcome) -> Option<ScheduleSummary> {
        let schedule = self.schedule.take()?;
        if let Some(timer) = self.tick_timer.take() {
            timer.abort();
        }
        self.parked_tick = None;

        let summary = schedule.finish(outcome);
        match summary.outcome {
            ScheduleOutcome::AbortedByFault(_) => error!(summary = %summary, "Interval capture aborted"),
            _ => info!(summary = %summary, "Interval capture finished"),
        }
        self.emit(ScheduleEvent::Finished(summary.clone()));
        self.last_summary = Some(summary.clone());
        Some(summary)
    }

    fn stop(&mut self, force: bool) -> Option<ScheduleSummary> {
        self.cancel_pending_start();
        let outcome = if force {
            ScheduleOutcome::ForceStopped
        } else {
            ScheduleOutcome::Stopped
        };
        self.finish_schedule(outcome)
    }

    fn shutdown(&mut self) -> Option<ScheduleSummary> {
        let summary = self.stop(false);
        self.close_camera();
        self.flush_transitions();
        summary
    }

    fn progress(&self) -> Progress {
        if let Some(schedule) = &self.schedule {
            return Progress {
                shots_taken: schedule.shots_taken,
                total_shots: schedule.total_shots,
                attempts: schedule.attempts,
                running: true,
                elapsed_label: format_elapsed(schedule.elapsed()),
            };
        }
        match &self.last_summary {
            Some(summary) => Progress {
                shots_taken: summary.shots_taken,
                total_shots: summary.total_shots,
                attempts: summary.attempts,
                running: false,
                elapsed_label: summary.elapsed_label(),
            },
            None => Progress::default(),
        }
    }

    // ===== Camera =====

    fn on_hardware_event(&mut self, event: HardwareEvent) {
        match self.manager.handle_event(event) {
            Some(ManagerNotice::Ready) => {
                debug!(pending_start = self.pending_start.is_some(), "Camera ready");
            }
            Some(ManagerNotice::CaptureFinished(result)) => self.on_capture_finished(result),
            Some(ManagerNotice::Faulted(e)) => {
                self.in_flight = None;
                self.parked_tick = None;
                self.finish_schedule(ScheduleOutcome::AbortedByFault(e));
            }
            None => {}
        }
    }

    fn on_timer(&mut self, message: TimerMessage) {
        match message {
            TimerMessage::Tick { generation } => self.tick(generation),
            TimerMessage::GraceExpired { generation } => self.on_grace_expired(generation),
        }
    }

    /// Pick the camera for the desired lens facing
    ///
    /// The configured camera wins when it points the right way.
    fn select(&self) -> OrchestratorResult<CameraId> {
        let facing = self.manager.desired_settings().lens_facing;
        let cameras = self.manager.enumerate_cameras()?;

        if let Some(preferred) = &self.options.camera_id
            && let Some(camera) = cameras
                .iter()
                .find(|camera| &camera.id == preferred && camera.facing == facing)
        {
            return Ok(camera.id.clone());
        }

        select_camera(&cameras, facing)
            .map(|camera| camera.id.clone())
            .ok_or_else(|| HardwareError::Unavailable("no cameras found".to_string()).into())
    }

    fn open_selected(&mut self) -> OrchestratorResult<()> {
        let camera = self.select()?;
        self.manager.open(camera)
    }

    fn open_camera(&mut self) -> OrchestratorResult<()> {
        match self.manager.state() {
            CameraState::Closed => self.open_selected(),
            CameraState::Faulted => {
                self.close_camera();
                self.open_selected()
            }
            _ => Ok(()),
        }
    }

    fn close_camera(&mut self) {
        self.manager.close();
        self.abandon_capture(OrchestratorError::ResourceClosed);
    }

    fn apply_settings(&mut self, requested: CaptureSettings) -> OrchestratorResult<CaptureSettings> {
        let current = *self.manager.desired_settings();

        if requires_reopen(&current, &requested) && self.manager.state().holds_device() {
            info!(
                from = %current.lens_facing,
                to = %requested.lens_facing,
                "Switching camera"
            );
            self.manager.set_desired(requested);
            self.close_camera();
            self.open_selected()?;
            return Ok(requested);
        }

        self.manager.apply_settings(requested)
    }

    fn capabilities(&mut self) -> OrchestratorResult<CapabilitySet> {
        if self.manager.camera_id().is_some() {
            return Ok(self.manager.capabilities()?);
        }
        let camera = self.select()?;
        Ok(self.manager.query_capabilities(&camera)?)
    }

    // ===== Plumbing =====

    fn persist(&self, shot: u32, image: CapturedImage, image_name: String) {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match storage::save_async(store, image.data, image_name).await {
                Ok(stored) => {
                    info!(shot, location = %stored.location, "Image saved");
                    ScheduleEvent::ImageSaved {
                        shot,
                        location: stored.location,
                    }
                }
                Err(error) => {
                    warn!(shot, error = %error, "Failed to save image");
                    ScheduleEvent::SaveFailed { shot, error }
                }
            };
            let _ = events.send(event);
        });
    }

    fn spawn_timer(&self, deadline: Instant, message: TimerMessage) -> JoinHandle<()> {
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = timers.send(message);
        })
    }

    fn flush_transitions(&mut self) {
        for state in self.manager.take_transitions() {
            self.emit(ScheduleEvent::CameraStateChanged(state));
        }
    }

    fn emit(&self, event: ScheduleEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
    use crate::storage::MemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_queued_stop_is_served_before_queued_tick() {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (hardware_tx, hardware_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (event_tx, _events) = mpsc::unbounded_channel();

        let options = OrchestratorOptions::default();
        let manager = CameraResourceManager::new(
            Box::new(VirtualCamera::new(VirtualCameraConfig::instant())),
            hardware_tx,
            options.initial_settings,
        );
        let orchestrator = Orchestrator::new(
            manager,
            Arc::new(MemoryStore::new()),
            event_tx,
            timer_tx.clone(),
            options,
        );
        tokio::spawn(orchestrator.run(command_rx, hardware_rx, timer_rx));

        let (reply, response) = oneshot::channel();
        assert!(command_tx.send(Command::OpenCamera { reply }).await.is_ok());
        response.await.unwrap().unwrap();

        // First shot is taken right away
        let (reply, response) = oneshot::channel();
        let start = Command::Start {
            interval_seconds: 5,
            total_shots: 3,
            reply,
        };
        assert!(command_tx.send(start).await.is_ok());
        response.await.unwrap().unwrap();

        // Both are queued before the owner task runs again
        assert!(timer_tx.send(TimerMessage::Tick { generation: 1 }).is_ok());
        let (reply, response) = oneshot::channel();
        assert!(command_tx.try_send(Command::Stop { force: false, reply }).is_ok());

        let summary = response.await.unwrap().unwrap();
        assert_eq!(summary.outcome, ScheduleOutcome::Stopped);
        assert_eq!(summary.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_command_ends_the_task() {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (hardware_tx, hardware_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (event_tx, _events) = mpsc::unbounded_channel();

        let options = OrchestratorOptions::default();
        let manager = CameraResourceManager::new(
            Box::new(VirtualCamera::new(VirtualCameraConfig::instant())),
            hardware_tx,
            options.initial_settings,
        );
        let orchestrator = Orchestrator::new(
            manager,
            Arc::new(MemoryStore::new()),
            event_tx,
            timer_tx,
            options,
        );
        let task = tokio::spawn(orchestrator.run(command_rx, hardware_rx, timer_rx));

        let (reply, response) = oneshot::channel();
        assert!(command_tx.send(Command::Shutdown { reply }).await.is_ok());
        assert_eq!(response.await.unwrap(), None);

        task.await.unwrap();
        assert!(command_tx.is_closed());
    }
}
