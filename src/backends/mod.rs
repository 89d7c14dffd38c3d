// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Interval capture (owner task)         │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │     Camera       │  │ Virtual Camera  │  │
//! │  │     (V4L2)       │  │  (simulated)    │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Hardware trait, resource manager and the V4L2 backend
//! - [`virtual_camera`]: Scriptable simulated camera for tests and demos

pub mod camera;
pub mod virtual_camera;
