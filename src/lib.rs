// SPDX-License-Identifier: MPL-2.0

//! Interval Camera - timed still capture for Linux cameras
//!
//! Takes a fixed number of photos at a fixed interval, driving the camera
//! through an explicit lifecycle state machine from a single owner task.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware boundary, V4L2 and virtual backends,
//!   and the camera resource manager
//! - [`pipelines`]: Interval capture schedule, settings negotiation and
//!   still rendering
//! - [`storage`]: Two-phase photo persistence
//! - [`config`]: User configuration handling
//! - [`constants`]: Limits and defaults
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! // Command line use:
//! // interval-camera run --interval 5 --shots 10
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraBackendType, CaptureSettings, CameraState, CapabilitySet};
pub use config::Config;
pub use errors::{HardwareError, OrchestratorError, StorageError};
pub use pipelines::interval::{
    IntervalCamera, OrchestratorOptions, Progress, ScheduleEvent, ScheduleOutcome,
    ScheduleSummary,
};
pub use storage::{DirectoryStore, MemoryStore, PhotoStore};
