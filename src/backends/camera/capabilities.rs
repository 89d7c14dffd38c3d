// SPDX-License-Identifier: GPL-3.0-only

//! Camera capability description and query
//!
//! A feature the camera does not have is described, not reported as an
//! error: an empty mode list, a zoom range of `[1.0, 1.0]` or an exposure
//! range of `[0, 0]`.

use super::CameraHardware;
use super::types::{CameraId, FocusMode, LensFacing, WhiteBalance};
use crate::errors::HardwareResult;
use tracing::debug;

/// Supported optical/digital zoom ratios
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f32,
    pub max: f32,
}

impl ZoomRange {
    /// Range of a camera without zoom
    pub const FIXED: ZoomRange = ZoomRange { min: 1.0, max: 1.0 };

    pub fn is_supported(&self) -> bool {
        self.max > self.min
    }
}

/// Exposure compensation range in backend steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureRange {
    pub min: i32,
    pub max: i32,
    /// Size of one step in EV
    pub step_ev: f32,
}

impl ExposureRange {
    /// Range of a camera without exposure compensation
    pub const UNSUPPORTED: ExposureRange = ExposureRange {
        min: 0,
        max: 0,
        step_ev: 0.0,
    };

    pub fn is_supported(&self) -> bool {
        self.max > self.min
    }
}

/// Hardware-reported capabilities of one camera
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySet {
    pub camera: CameraId,
    pub facing: LensFacing,
    pub focus_modes: Vec<FocusMode>,
    pub white_balance_modes: Vec<WhiteBalance>,
    pub zoom: ZoomRange,
    pub exposure: ExposureRange,
    /// Largest still resolution, used to size the image sink
    pub still_resolution: (u32, u32),
}

impl CapabilitySet {
    /// Capability set of a camera that exposes no controls at all
    pub fn minimal(camera: CameraId, facing: LensFacing, still_resolution: (u32, u32)) -> Self {
        Self {
            camera,
            facing,
            focus_modes: Vec::new(),
            white_balance_modes: Vec::new(),
            zoom: ZoomRange::FIXED,
            exposure: ExposureRange::UNSUPPORTED,
            still_resolution,
        }
    }

    /// Repair what backends commonly get wrong: swapped bounds, duplicated
    /// modes, zoom ratios below 1.0 and zero-sized resolutions.
    fn normalized(mut self) -> Self {
        if self.zoom.min > self.zoom.max {
            std::mem::swap(&mut self.zoom.min, &mut self.zoom.max);
        }
        if !self.zoom.min.is_finite() || self.zoom.min < 1.0 {
            self.zoom.min = 1.0;
        }
        if !self.zoom.max.is_finite() || self.zoom.max < self.zoom.min {
            self.zoom.max = self.zoom.min;
        }

        if self.exposure.min > self.exposure.max {
            std::mem::swap(&mut self.exposure.min, &mut self.exposure.max);
        }
        if !self.exposure.is_supported() {
            self.exposure = ExposureRange::UNSUPPORTED;
        }

        dedup_in_order(&mut self.focus_modes);
        dedup_in_order(&mut self.white_balance_modes);

        let (w, h) = self.still_resolution;
        self.still_resolution = (w.max(1), h.max(1));
        self
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn list<T: std::fmt::Display>(items: &[T]) -> String {
            if items.is_empty() {
                "not supported".to_string()
            } else {
                items
                    .iter()
                    .map(|item| item.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        writeln!(f, "Camera:         {} ({})", self.camera, self.facing)?;
        writeln!(
            f,
            "Resolution:     {}x{}",
            self.still_resolution.0, self.still_resolution.1
        )?;
        writeln!(f, "Focus modes:    {}", list(&self.focus_modes))?;
        writeln!(f, "White balance:  {}", list(&self.white_balance_modes))?;
        if self.exposure.is_supported() {
            writeln!(
                f,
                "Exposure:       {} to {} (step {:.2} EV)",
                self.exposure.min, self.exposure.max, self.exposure.step_ev
            )?;
        } else {
            writeln!(f, "Exposure:       not supported")?;
        }
        write!(
            f,
            "Zoom:           {:.1}x to {:.1}x",
            self.zoom.min, self.zoom.max
        )
    }
}

fn dedup_in_order<T: PartialEq + Copy>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(*item);
            true
        }
    });
}

/// Query the capabilities of a camera
///
/// No side effects. Must be called again after the selected camera changes
/// or the camera was reopened.
pub fn query(hardware: &dyn CameraHardware, camera: &CameraId) -> HardwareResult<CapabilitySet> {
    let caps = hardware.query_capabilities(camera)?.normalized();
    debug!(
        camera = %camera,
        focus = caps.focus_modes.len(),
        white_balance = caps.white_balance_modes.len(),
        zoom_max = caps.zoom.max,
        exposure_supported = caps.exposure.is_supported(),
        "Queried camera capabilities"
    );
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> CapabilitySet {
        CapabilitySet::minimal(CameraId::new("test"), LensFacing::Back, (640, 480))
    }

    #[test]
    fn test_normalize_swapped_ranges() {
        let mut raw = caps();
        raw.zoom = ZoomRange { min: 4.0, max: 1.0 };
        raw.exposure = ExposureRange {
            min: 6,
            max: -6,
            step_ev: 0.5,
        };
        let caps = raw.normalized();
        assert_eq!(caps.zoom, ZoomRange { min: 1.0, max: 4.0 });
        assert_eq!((caps.exposure.min, caps.exposure.max), (-6, 6));
    }

    #[test]
    fn test_normalize_keeps_unsupported_representable() {
        let mut raw = caps();
        raw.zoom = ZoomRange { min: 0.0, max: 0.5 };
        raw.exposure = ExposureRange {
            min: 3,
            max: 3,
            step_ev: 1.0,
        };
        let caps = raw.normalized();
        assert_eq!(caps.zoom, ZoomRange::FIXED);
        assert!(!caps.zoom.is_supported());
        assert_eq!(caps.exposure, ExposureRange::UNSUPPORTED);
    }

    #[test]
    fn test_normalize_dedups_modes() {
        let mut raw = caps();
        raw.focus_modes = vec![FocusMode::Manual, FocusMode::Auto, FocusMode::Manual];
        let caps = raw.normalized();
        assert_eq!(caps.focus_modes, vec![FocusMode::Manual, FocusMode::Auto]);
    }

    #[test]
    fn test_display_reports_unsupported_features() {
        let text = caps().to_string();
        assert!(text.contains("Focus modes:    not supported"));
        assert!(text.contains("Exposure:       not supported"));
    }
}
