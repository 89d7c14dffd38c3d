// SPDX-License-Identifier: GPL-3.0-only

//! Settings negotiation
//!
//! Maps requested [`CaptureSettings`] onto values the camera accepts. The
//! mapping is total: anything unsupported falls back to a safe value instead
//! of failing.

use crate::backends::camera::capabilities::CapabilitySet;
use crate::backends::camera::types::{CaptureSettings, FocusMode, WhiteBalance};
use tracing::debug;

/// Negotiate a settings snapshot against a capability set
///
/// - zoom is clamped into the supported range
/// - exposure is clamped into the supported range, or forced to 0 when the
///   camera has no exposure compensation
/// - focus and white balance fall back to `Auto` when supported, otherwise
///   to the first supported mode
///
/// The lens facing is passed through untouched; switching lenses is a
/// close/open cycle handled by the caller (see [`requires_reopen`]).
pub fn negotiate(requested: &CaptureSettings, caps: &CapabilitySet) -> CaptureSettings {
    let zoom_min = if caps.zoom.min.is_finite() { caps.zoom.min } else { 1.0 };
    let zoom_max = if caps.zoom.max.is_finite() {
        caps.zoom.max.max(zoom_min)
    } else {
        zoom_min
    };
    let zoom_ratio = if requested.zoom_ratio.is_nan() {
        zoom_min
    } else {
        requested.zoom_ratio.clamp(zoom_min, zoom_max)
    };

    let exposure_index = if caps.exposure.is_supported() {
        requested
            .exposure_index
            .clamp(caps.exposure.min, caps.exposure.max)
    } else {
        0
    };

    let focus_mode = pick_mode(requested.focus_mode, &caps.focus_modes, FocusMode::Auto);
    let white_balance = pick_mode(
        requested.white_balance,
        &caps.white_balance_modes,
        WhiteBalance::Auto,
    );

    let negotiated = CaptureSettings {
        lens_facing: requested.lens_facing,
        zoom_ratio,
        focus_mode,
        exposure_index,
        white_balance,
    };

    if negotiated != *requested {
        debug!(requested = %requested, negotiated = %negotiated, "Adjusted capture settings");
    }

    negotiated
}

/// A lens change needs a different physical camera, i.e. a new handle
pub fn requires_reopen(current: &CaptureSettings, requested: &CaptureSettings) -> bool {
    current.lens_facing != requested.lens_facing
}

/// Requested mode if supported, else `fallback` if supported, else the first
/// supported mode. A camera reporting no modes at all keeps `fallback`.
fn pick_mode<T: Copy + PartialEq>(requested: T, supported: &[T], fallback: T) -> T {
    if supported.contains(&requested) {
        requested
    } else if supported.is_empty() || supported.contains(&fallback) {
        fallback
    } else {
        supported[0]
    }
}
