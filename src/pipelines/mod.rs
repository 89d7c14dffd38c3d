// SPDX-License-Identifier: MPL-2.0

//! Capture pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ IntervalCam  │ ──▶ │  Camera backend   │ ──▶ │  PhotoStore  │
//! │  schedule    │     │  (JPEG stills)    │     │  (two-phase) │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`interval`]: Timed capture schedule, settings negotiation and the owner task
//! - [`photo`]: Software post-processing and JPEG encoding of raw frames

pub mod interval;
pub mod photo;
