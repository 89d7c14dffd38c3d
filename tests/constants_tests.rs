// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use interval_camera::constants::*;

#[test]
fn test_interval_bounds() {
    assert!(!is_valid_interval(MIN_INTERVAL_SECONDS - 1));
    assert!(is_valid_interval(MIN_INTERVAL_SECONDS));
    assert!(is_valid_interval(MAX_INTERVAL_SECONDS));
    assert!(!is_valid_interval(MAX_INTERVAL_SECONDS + 1));
}

#[test]
fn test_shot_count_bounds() {
    assert!(!is_valid_shot_count(0));
    assert!(is_valid_shot_count(MIN_TOTAL_SHOTS));
    assert!(is_valid_shot_count(MAX_TOTAL_SHOTS));
    assert!(!is_valid_shot_count(MAX_TOTAL_SHOTS + 1));
}

#[test]
fn test_defaults_are_valid() {
    // Defaults pre-populate a run, so they must pass validation
    assert!(is_valid_interval(DEFAULT_INTERVAL_SECONDS));
    assert!(is_valid_shot_count(DEFAULT_TOTAL_SHOTS));
}

#[test]
fn test_grace_delay() {
    assert_eq!(CAMERA_GRACE_DELAY.as_millis(), 2000);
}
