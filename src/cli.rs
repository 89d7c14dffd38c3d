// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for interval capture
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Showing camera capabilities
//! - Running an interval capture
//! - Showing and resetting the saved configuration

use interval_camera::backends::camera::{
    CameraId, CaptureSettings, FocusMode, LensFacing, WhiteBalance, create_backend,
};
use interval_camera::config::Config;
use interval_camera::constants::CAMERA_GRACE_DELAY;
use interval_camera::errors::OrchestratorError;
use interval_camera::pipelines::interval::{
    IntervalCamera, OrchestratorOptions, ScheduleEvent, ScheduleOutcome, ScheduleSummary, schedule,
};
use interval_camera::storage::{self, DirectoryStore, MemoryStore, PhotoStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Options of the `run` command that override the saved configuration
#[derive(Debug, Default)]
pub struct RunOptions {
    pub interval: Option<u32>,
    pub shots: Option<u32>,
    pub lens: Option<LensFacing>,
    pub zoom: Option<f32>,
    pub focus: Option<FocusMode>,
    pub exposure: Option<i32>,
    pub white_balance: Option<WhiteBalance>,
    pub camera: Option<String>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
    pub no_save: bool,
}

impl RunOptions {
    fn apply_to(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.interval_seconds = interval;
        }
        if let Some(shots) = self.shots {
            config.total_shots = shots;
        }
        let settings = &mut config.settings;
        if let Some(lens) = self.lens {
            settings.lens_facing = lens;
        }
        if let Some(zoom) = self.zoom {
            settings.zoom_ratio = zoom;
        }
        if let Some(focus) = self.focus {
            settings.focus_mode = focus;
        }
        if let Some(exposure) = self.exposure {
            settings.exposure_index = exposure;
        }
        if let Some(white_balance) = self.white_balance {
            settings.white_balance = white_balance;
        }
        if let Some(camera) = &self.camera {
            config.last_camera_id = Some(camera.clone());
        }
        if let Some(output) = &self.output {
            config.output_dir = Some(output.clone());
        }
    }
}

fn orchestrator_options(config: &Config, settings: CaptureSettings) -> OrchestratorOptions {
    OrchestratorOptions {
        grace_delay: CAMERA_GRACE_DELAY,
        camera_id: config.last_camera_id.clone().map(CameraId::new),
        initial_settings: settings,
    }
}

/// List all available cameras
pub fn list_cameras(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let hardware = create_backend(config.backend);
    let cameras = hardware.enumerate_cameras()?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", config.backend);
    println!();
    for camera in &cameras {
        println!("  {} [{}]", camera.name, camera.facing);
        println!("      Id: {}", camera.id);
    }

    Ok(())
}

/// Print what the camera for a lens facing supports
pub fn show_capabilities(
    config: &Config,
    lens: Option<LensFacing>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = CaptureSettings {
        lens_facing: lens.unwrap_or(config.settings.lens_facing),
        ..config.settings
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let caps = runtime.block_on(async {
        let (camera, _events) = IntervalCamera::spawn(
            create_backend(config.backend),
            Arc::new(MemoryStore::new()),
            orchestrator_options(config, settings),
        );
        let result = camera.capabilities().await;
        camera.shutdown().await;
        result
    })?;

    println!("{}", caps);
    Ok(())
}

/// Run an interval capture until it completes or Ctrl+C is pressed
pub fn run_interval(
    mut config: Config,
    options: RunOptions,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    options.apply_to(&mut config);
    schedule::validate(config.interval_seconds, config.total_shots)?;

    if !options.no_save
        && let Err(e) = config.save(config_path)
    {
        eprintln!("Warning: could not save configuration: {}", e);
    }

    let store: Arc<dyn PhotoStore> = if options.dry_run {
        println!("Dry run: photos are kept in memory only");
        Arc::new(MemoryStore::new())
    } else {
        let dir = config
            .output_dir
            .clone()
            .unwrap_or_else(storage::default_photo_dir);
        println!("Saving photos to {}", dir.display());
        Arc::new(DirectoryStore::new(dir))
    };

    // First Ctrl+C stops, a second one stops without waiting for saves
    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(async {
        let (camera, mut events) = IntervalCamera::spawn(
            create_backend(config.backend),
            store,
            orchestrator_options(&config, config.settings),
        );

        println!(
            "Capturing {} shots every {}s (press Ctrl+C to stop)",
            config.total_shots, config.interval_seconds
        );

        tokio::select! {
            result = camera.start(config.interval_seconds, config.total_shots) => {
                if let Err(e) = result {
                    camera.shutdown().await;
                    return Err(e);
                }
            }
            _ = interrupts.recv() => {
                camera.shutdown().await;
                return Ok(None);
            }
        }

        let mut summary: Option<ScheduleSummary> = None;
        let mut captured = 0u32;
        let mut stored = 0u32;
        let mut stopping = false;

        loop {
            // Finished and every captured shot saved or failed
            if summary.is_some() && stored >= captured {
                break;
            }

            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match &event {
                        ScheduleEvent::ShotCaptured { .. } => captured += 1,
                        ScheduleEvent::ImageSaved { .. } | ScheduleEvent::SaveFailed { .. } => {
                            stored += 1
                        }
                        ScheduleEvent::Finished(finished) => summary = Some(finished.clone()),
                        ScheduleEvent::CameraStateChanged(_) => continue,
                        _ => {}
                    }
                    let progress = camera.progress().await?;
                    println!("[{}] {}", progress, event);
                }
                _ = interrupts.recv() => {
                    if stopping {
                        println!("Stopping without waiting for pending saves...");
                        if let Some(forced) = camera.force_stop().await {
                            summary = Some(forced);
                        }
                        break;
                    }
                    stopping = true;
                    println!();
                    println!("Stopping...");
                    if let Some(stopped) = camera.stop().await {
                        summary = Some(stopped);
                    }
                }
            }
        }

        camera.shutdown().await;
        Ok::<_, OrchestratorError>(summary)
    })?;

    match summary {
        Some(summary) => {
            println!();
            println!(
                "Done: {}/{} shots in {} ({})",
                summary.shots_taken,
                summary.total_shots,
                summary.elapsed_label(),
                summary.outcome
            );
            if let ScheduleOutcome::AbortedByFault(e) = summary.outcome {
                return Err(format!("capture aborted: {}", e).into());
            }
        }
        None => println!("Interrupted before the first capture."),
    }

    Ok(())
}

/// Print the saved configuration
pub fn show_config(config: &Config, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let saved = if Config::has_saved(config_path) {
        "saved"
    } else {
        "defaults, not saved yet"
    };
    println!("Configuration: {} ({})", config_path.display(), saved);
    println!();
    println!("{}", config);
    Ok(())
}

/// Reset the saved configuration to defaults
pub fn reset_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(config_path);
    config.reset();
    config.save(config_path)?;
    println!("Configuration reset: {}", config_path.display());
    Ok(())
}
