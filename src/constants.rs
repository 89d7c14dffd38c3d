// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Shortest accepted interval between two captures
pub const MIN_INTERVAL_SECONDS: u32 = 1;

/// Longest accepted interval between two captures (one hour)
pub const MAX_INTERVAL_SECONDS: u32 = 3600;

/// Smallest accepted shot count for a schedule
pub const MIN_TOTAL_SHOTS: u32 = 1;

/// Largest accepted shot count for a schedule
pub const MAX_TOTAL_SHOTS: u32 = 1000;

/// Interval used when nothing has been saved yet
pub const DEFAULT_INTERVAL_SECONDS: u32 = 5;

/// Shot count used when nothing has been saved yet
pub const DEFAULT_TOTAL_SHOTS: u32 = 10;

/// How long `start` waits for a closed camera to become ready
///
/// The camera is opened when `start` is called and checked exactly once when
/// this delay expires. There is no second retry.
pub const CAMERA_GRACE_DELAY: Duration = Duration::from_millis(2000);

/// JPEG quality used for frames the backend has to encode itself
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// `chrono` format for capture file names (e.g. `2024-05-01-13-45-10-123`)
pub const CAPTURE_FILENAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Extension appended to every capture file name
pub const CAPTURE_FILE_EXTENSION: &str = "jpg";

/// Directory name used below the XDG config and pictures directories
pub const APP_DIR_NAME: &str = "interval-camera";

/// Capacity of the command queue between control handles and the owner task
pub const COMMAND_QUEUE_DEPTH: usize = 32;

/// Frames discarded after stream start so auto exposure can settle (V4L2)
pub const V4L2_WARMUP_FRAMES: usize = 3;

/// Number of memory-mapped buffers requested for a V4L2 capture stream
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// Check whether an interval is inside the accepted range
pub fn is_valid_interval(seconds: u32) -> bool {
    (MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&seconds)
}

/// Check whether a shot count is inside the accepted range
pub fn is_valid_shot_count(shots: u32) -> bool {
    (MIN_TOTAL_SHOTS..=MAX_TOTAL_SHOTS).contains(&shots)
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
