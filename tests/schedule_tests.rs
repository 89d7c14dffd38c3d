// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the interval capture schedule
//!
//! All tests run on tokio's paused clock, so a ten second schedule finishes
//! instantly and capture times can be compared exactly.

use interval_camera::backends::camera::{CameraId, CameraState, CaptureSettings, FocusMode, LensFacing};
use interval_camera::backends::virtual_camera::{
    BACK_CAMERA_ID, FRONT_CAMERA_ID, VirtualCamera, VirtualCameraConfig, VirtualCameraStats,
};
use interval_camera::errors::{HardwareError, OrchestratorError};
use interval_camera::pipelines::interval::{
    IntervalCamera, OrchestratorOptions, Progress, ScheduleEvent, ScheduleOutcome, ScheduleSummary,
};
use interval_camera::storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

/// Default latencies with tiny frames
fn quick_config() -> VirtualCameraConfig {
    VirtualCameraConfig {
        resolution: (64, 48),
        ..VirtualCameraConfig::default()
    }
}

fn spawn_with_store(
    config: VirtualCameraConfig,
    store: Arc<MemoryStore>,
) -> (
    IntervalCamera,
    UnboundedReceiver<ScheduleEvent>,
    VirtualCameraStats,
) {
    let hardware = VirtualCamera::new(config);
    let stats = hardware.stats();
    let (camera, events) =
        IntervalCamera::spawn(Box::new(hardware), store, OrchestratorOptions::default());
    (camera, events, stats)
}

fn spawn(
    config: VirtualCameraConfig,
) -> (
    IntervalCamera,
    UnboundedReceiver<ScheduleEvent>,
    VirtualCameraStats,
) {
    spawn_with_store(config, Arc::new(MemoryStore::new()))
}

async fn wait_for_state(camera: &IntervalCamera, state: CameraState) {
    while camera.camera_state().await.unwrap() != state {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn open_ready(camera: &IntervalCamera) {
    camera.open_camera().await.unwrap();
    wait_for_state(camera, CameraState::Ready).await;
}

/// Collect events up to and including the next `Finished`
async fn until_finished(
    events: &mut UnboundedReceiver<ScheduleEvent>,
) -> (Vec<ScheduleEvent>, ScheduleSummary) {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        if let ScheduleEvent::Finished(summary) = &event {
            let summary = summary.clone();
            seen.push(event);
            return (seen, summary);
        }
        seen.push(event);
    }
    panic!("event stream closed before the schedule finished");
}

fn drain(events: &mut UnboundedReceiver<ScheduleEvent>) -> Vec<ScheduleEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn count_finished(events: &[ScheduleEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ScheduleEvent::Finished(_)))
        .count()
}

fn offsets(requests: &[Instant], t0: Instant) -> Vec<Duration> {
    requests.iter().map(|t| *t - t0).collect()
}

#[tokio::test(start_paused = true)]
async fn test_captures_are_spaced_by_interval() {
    let (camera, mut events, stats) = spawn(quick_config());
    open_ready(&camera).await;

    let t0 = Instant::now();
    camera.start(5, 3).await.unwrap();
    let (seen, summary) = until_finished(&mut events).await;

    assert_eq!(summary.outcome, ScheduleOutcome::Completed);
    assert_eq!(summary.shots_taken, 3);
    assert_eq!(summary.attempts, 3);
    assert_eq!(
        offsets(&stats.capture_requests(), t0),
        vec![
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_secs(10)
        ]
    );
    assert_eq!(count_finished(&seen), 1);

    let progress = camera.progress().await.unwrap();
    assert_eq!(progress.shots_taken, 3);
    assert_eq!(progress.total_shots, 3);
    assert!(!progress.running);
    assert_eq!(progress.elapsed_label, "10s");
}

#[tokio::test(start_paused = true)]
async fn test_force_stop_halts_ticks() {
    let (camera, mut events, stats) = spawn(quick_config());
    open_ready(&camera).await;

    let t0 = Instant::now();
    camera.start(5, 3).await.unwrap();
    tokio::time::sleep_until(t0 + Duration::from_secs(7)).await;

    let summary = camera.force_stop().await.unwrap();
    assert_eq!(summary.outcome, ScheduleOutcome::ForceStopped);
    assert_eq!(summary.shots_taken, 2);
    assert_eq!(summary.elapsed_label(), "7s");

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(stats.capture_count(), 2);
    assert_eq!(count_finished(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_arguments_touch_nothing() {
    let (camera, mut events, stats) = spawn(quick_config());

    for (interval, shots) in [(0, 10), (3601, 10), (5, 0), (5, 1001)] {
        assert!(matches!(
            camera.start(interval, shots).await,
            Err(OrchestratorError::InvalidArgument(_))
        ));
    }

    assert_eq!(camera.progress().await.unwrap(), Progress::default());
    assert_eq!(camera.camera_state().await.unwrap(), CameraState::Closed);
    assert!(stats.opened_cameras().is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_schedule_is_noop() {
    let (camera, mut events, _stats) = spawn(VirtualCameraConfig::instant());
    assert_eq!(camera.stop().await, None);
    assert_eq!(camera.force_stop().await, None);

    open_ready(&camera).await;
    camera.start(5, 10).await.unwrap();
    let summary = camera.stop().await.unwrap();
    assert_eq!(summary.outcome, ScheduleOutcome::Stopped);
    assert_eq!(summary.shots_taken, 1);

    assert_eq!(camera.stop().await, None);
    assert_eq!(count_finished(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_opens_camera_and_waits_grace_delay() {
    let (camera, _events, stats) = spawn(quick_config());

    let t0 = Instant::now();
    camera.start(5, 10).await.unwrap();

    assert_eq!(stats.opened_cameras(), vec![CameraId::new(BACK_CAMERA_ID)]);
    assert_eq!(
        offsets(&stats.capture_requests(), t0),
        vec![Duration::from_secs(2)]
    );
    assert!(camera.progress().await.unwrap().running);
    camera.force_stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_camera_not_ready_after_grace_delay() {
    let (camera, mut events, stats) = spawn(VirtualCameraConfig {
        open_latency: Duration::from_secs(3),
        ..quick_config()
    });

    assert_eq!(
        camera.start(5, 10).await,
        Err(OrchestratorError::CameraNotReady)
    );

    let progress = camera.progress().await.unwrap();
    assert_eq!(progress.shots_taken, 0);
    assert!(!progress.running);
    assert_eq!(stats.capture_count(), 0);

    let seen = drain(&mut events);
    assert!(
        seen.iter()
            .all(|e| matches!(e, ScheduleEvent::CameraStateChanged(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_aborts_schedule() {
    let (camera, mut events, stats) = spawn(VirtualCameraConfig {
        disconnect_on_capture: Some(2),
        ..VirtualCameraConfig::instant()
    });
    open_ready(&camera).await;

    camera.start(1, 5).await.unwrap();
    let (_, summary) = until_finished(&mut events).await;

    assert_eq!(
        summary.outcome,
        ScheduleOutcome::AbortedByFault(HardwareError::Disconnected)
    );
    assert_eq!(summary.shots_taken, 1);
    assert_eq!(summary.attempts, 2);
    assert_eq!(camera.camera_state().await.unwrap(), CameraState::Faulted);
    assert_eq!(stats.released_sessions(), 1);
    assert_eq!(stats.closed_handles(), 1);

    // A new start recovers from the fault by reopening
    camera.start(1, 1).await.unwrap();
    let (_, summary) = until_finished(&mut events).await;
    assert_eq!(summary.outcome, ScheduleOutcome::Completed);
    assert_eq!(stats.opened_cameras().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_does_not_abort() {
    let (camera, mut events, _stats) = spawn(VirtualCameraConfig {
        failing_captures: vec![2],
        ..VirtualCameraConfig::instant()
    });
    open_ready(&camera).await;

    camera.start(1, 3).await.unwrap();
    let (seen, summary) = until_finished(&mut events).await;

    assert_eq!(summary.outcome, ScheduleOutcome::Completed);
    assert_eq!(summary.shots_taken, 2);
    assert_eq!(summary.attempts, 3);

    let failures: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            ScheduleEvent::ShotFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_settings_are_negotiated() {
    let (camera, _events, stats) = spawn(VirtualCameraConfig::instant());

    let zoomed = CaptureSettings {
        zoom_ratio: 10.0,
        ..Default::default()
    };
    assert_eq!(
        camera.apply_settings(zoomed).await,
        Err(OrchestratorError::NotReady(CameraState::Closed))
    );

    // The request is kept and pushed once the camera is ready
    open_ready(&camera).await;
    assert_eq!(stats.applied_settings().last().map(|s| s.zoom_ratio), Some(4.0));

    let applied = camera.apply_settings(zoomed).await.unwrap();
    assert_eq!(applied.zoom_ratio, 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_lens_switch_reopens_camera() {
    let (camera, _events, stats) = spawn(VirtualCameraConfig::instant());
    open_ready(&camera).await;

    let front_manual = CaptureSettings {
        lens_facing: LensFacing::Front,
        focus_mode: FocusMode::Manual,
        zoom_ratio: 2.0,
        ..Default::default()
    };
    assert_eq!(camera.apply_settings(front_manual).await, Ok(front_manual));
    wait_for_state(&camera, CameraState::Ready).await;

    assert_eq!(
        stats.opened_cameras(),
        vec![CameraId::new(BACK_CAMERA_ID), CameraId::new(FRONT_CAMERA_ID)]
    );
    let applied = stats.applied_settings().last().copied().unwrap();
    assert_eq!(applied.lens_facing, LensFacing::Front);
    assert_eq!(applied.focus_mode, FocusMode::Auto);
    assert_eq!(applied.zoom_ratio, 1.0);

    let caps = camera.capabilities().await.unwrap();
    assert_eq!(caps.camera, CameraId::new(FRONT_CAMERA_ID));
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_does_not_abort() {
    let store = Arc::new(MemoryStore::with_failures(vec![1]));
    let (camera, mut events, _stats) =
        spawn_with_store(VirtualCameraConfig::instant(), store.clone());
    open_ready(&camera).await;

    camera.start(1, 3).await.unwrap();

    let mut summary = None;
    let mut saved = Vec::new();
    let mut failed = Vec::new();
    while summary.is_none() || saved.len() + failed.len() < 3 {
        match events.recv().await.unwrap() {
            ScheduleEvent::Finished(finished) => summary = Some(finished),
            ScheduleEvent::ImageSaved { shot, .. } => saved.push(shot),
            ScheduleEvent::SaveFailed { shot, .. } => failed.push(shot),
            _ => {}
        }
    }

    let summary = summary.unwrap();
    assert_eq!(summary.outcome, ScheduleOutcome::Completed);
    assert_eq!(summary.shots_taken, 3);
    assert_eq!(failed, vec![1]);
    assert_eq!(store.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_later_start_cancels_pending_start() {
    let (camera, mut events, _stats) = spawn(quick_config());

    let first = tokio::spawn({
        let camera = camera.clone();
        async move { camera.start(5, 3).await }
    });
    // The first start has been handled once the camera starts opening
    loop {
        if let Some(ScheduleEvent::CameraStateChanged(CameraState::Opening)) = events.recv().await
        {
            break;
        }
    }

    camera.start(5, 2).await.unwrap();
    assert_eq!(first.await.unwrap(), Err(OrchestratorError::Cancelled));

    let summary = camera.stop().await.unwrap();
    assert_eq!(summary.total_shots, 2);
    let started = drain(&mut events)
        .iter()
        .filter(|e| matches!(e, ScheduleEvent::Started { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_capture_stays_sequential() {
    let (camera, mut events, stats) = spawn(VirtualCameraConfig {
        capture_latency: Duration::from_secs(1),
        ..quick_config()
    });
    open_ready(&camera).await;

    let t0 = Instant::now();
    camera.start(5, 3).await.unwrap();
    let stopped = camera.stop().await.unwrap();
    assert_eq!(stopped.shots_taken, 0);
    assert_eq!(stopped.attempts, 1);

    // The first capture is still outstanding; the new schedule waits for it
    camera.start(5, 1).await.unwrap();
    let (_, first) = until_finished(&mut events).await;
    assert_eq!(first.outcome, ScheduleOutcome::Stopped);
    let (seen, second) = until_finished(&mut events).await;
    assert_eq!(second.outcome, ScheduleOutcome::Completed);
    assert_eq!(second.shots_taken, 1);

    assert_eq!(
        offsets(&stats.capture_requests(), t0),
        vec![Duration::ZERO, Duration::from_secs(1)]
    );
    let captured = seen
        .iter()
        .filter(|e| matches!(e, ScheduleEvent::ShotCaptured { .. }))
        .count();
    assert_eq!(captured, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_schedule_and_closes_camera() {
    let (camera, mut events, stats) = spawn(VirtualCameraConfig::instant());
    open_ready(&camera).await;
    camera.start(5, 10).await.unwrap();

    let summary = camera.shutdown().await.unwrap();
    assert_eq!(summary.outcome, ScheduleOutcome::Stopped);
    assert_eq!(stats.closed_handles(), 1);
    assert_eq!(
        camera.start(5, 10).await,
        Err(OrchestratorError::Shutdown)
    );

    let seen = drain(&mut events);
    assert_eq!(count_finished(&seen), 1);
    assert_eq!(
        seen.last(),
        Some(&ScheduleEvent::CameraStateChanged(CameraState::Closed))
    );
}
