// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use interval_camera::backends::camera::{CameraBackendType, LensFacing, WhiteBalance};
use interval_camera::config::Config;
use interval_camera::constants::{DEFAULT_INTERVAL_SECONDS, DEFAULT_TOTAL_SHOTS};
use std::path::PathBuf;

fn scratch_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("interval-camera-config-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

fn cleanup(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.interval_seconds, DEFAULT_INTERVAL_SECONDS);
    assert_eq!(config.total_shots, DEFAULT_TOTAL_SHOTS);
    assert_eq!(config.backend, CameraBackendType::V4l2);
    assert_eq!(config.settings.lens_facing, LensFacing::Back);
    assert_eq!(config.settings.zoom_ratio, 1.0);
}

#[test]
fn test_missing_file_gives_defaults() {
    let path = scratch_path();
    assert!(!Config::has_saved(&path));
    assert_eq!(Config::load_or_default(&path), Config::default());
}

#[test]
fn test_save_and_load() {
    let path = scratch_path();
    let mut config = Config::default();
    config.interval_seconds = 30;
    config.total_shots = 120;
    config.settings.white_balance = WhiteBalance::Cloudy;
    config.backend = CameraBackendType::Virtual;

    // Parent directory does not exist yet
    config.save(&path).unwrap();
    assert!(Config::has_saved(&path));

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);

    cleanup(&path);
}

#[test]
fn test_malformed_file_falls_back() {
    let path = scratch_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load(&path).is_err());
    assert_eq!(Config::load_or_default(&path), Config::default());

    cleanup(&path);
}

#[test]
fn test_out_of_range_values_are_replaced() {
    let path = scratch_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "interval_seconds": 0, "total_shots": 20 }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.interval_seconds, DEFAULT_INTERVAL_SECONDS);
    assert_eq!(config.total_shots, 20);

    cleanup(&path);
}
