// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera control interface
//!
//! Queries the controls a device exposes for zoom, focus, exposure bias and
//! white balance, maps them into a capability description, and writes a
//! settings snapshot as a batch of control values that is rolled back when
//! any single write fails.
//!
//! Inspired by [cameractrls](https://github.com/soyersoyer/cameractrls).

use super::capabilities::{ExposureRange, ZoomRange};
use super::types::{CaptureSettings, FocusMode, WhiteBalance};
use crate::errors::{HardwareError, HardwareResult};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_USER: u32 = 0x00980000;
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;

const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs (User Class) =====

/// Automatic white balance
pub const V4L2_CID_AUTO_WHITE_BALANCE: u32 = V4L2_CID_BASE + 12;
/// White balance temperature in Kelvin
pub const V4L2_CID_WHITE_BALANCE_TEMPERATURE: u32 = V4L2_CID_BASE + 26;

// ===== V4L2 Control IDs (Camera Class) =====

/// Focus control (manual focus position)
pub const V4L2_CID_FOCUS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 10;
/// Auto focus enable
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
/// Absolute zoom position
pub const V4L2_CID_ZOOM_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 13;
/// Exposure compensation (EV bias) in 0.001 EV units
pub const V4L2_CID_AUTO_EXPOSURE_BIAS: u32 = V4L2_CID_CAMERA_CLASS_BASE + 19;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
// where dir: 2=READ, 1=WRITE, 3=READ|WRITE

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

/// Zoom units per 1.0x when the driver reports a zero minimum
const ZOOM_UNITS_PER_RATIO: f32 = 100.0;

/// Exposure bias units per EV (the control is specified in 0.001 EV)
const EXPOSURE_BIAS_UNITS_PER_EV: f32 = 1000.0;

// ===== V4L2 ioctl Structures =====

/// V4L2 control get/set structure
#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// V4L2 query control structure
#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

// ===== Public Types =====

/// Information about a V4L2 control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    /// Check if control is disabled
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.minimum.min(self.maximum), self.maximum.max(self.minimum))
    }
}

/// Extract a null-terminated string from a fixed-size byte array
fn extract_name(bytes: &[u8; 32]) -> String {
    let name_len = bytes.iter().position(|&c| c == 0).unwrap_or(32);
    String::from_utf8_lossy(&bytes[..name_len]).to_string()
}

// ===== ioctl wrappers =====

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL, &mut qctrl as *mut V4l2Queryctrl) };

    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        step: qctrl.step,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> HardwareResult<()> {
    let file = File::open(device_path)?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        if errno.raw_os_error() == Some(libc::ENODEV) {
            return Err(HardwareError::Disconnected);
        }
        return Err(HardwareError::SettingsRejected(format!(
            "control {:#x}: {}",
            control_id, errno
        )));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

// ===== Capability mapping =====

/// The controls relevant to still capture that a device exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceControls {
    pub zoom: Option<ControlInfo>,
    pub focus_auto: Option<ControlInfo>,
    pub focus_absolute: Option<ControlInfo>,
    pub exposure_bias: Option<ControlInfo>,
    pub auto_white_balance: Option<ControlInfo>,
    pub white_balance_temperature: Option<ControlInfo>,
}

impl DeviceControls {
    /// Query every relevant control, skipping disabled ones
    pub fn probe(device_path: &str) -> Self {
        let query = |id| query_control(device_path, id).filter(|info| !info.is_disabled());
        let controls = Self {
            zoom: query(V4L2_CID_ZOOM_ABSOLUTE),
            focus_auto: query(V4L2_CID_FOCUS_AUTO),
            focus_absolute: query(V4L2_CID_FOCUS_ABSOLUTE),
            exposure_bias: query(V4L2_CID_AUTO_EXPOSURE_BIAS),
            auto_white_balance: query(V4L2_CID_AUTO_WHITE_BALANCE),
            white_balance_temperature: query(V4L2_CID_WHITE_BALANCE_TEMPERATURE),
        };
        debug!(device_path, ?controls, "Probed V4L2 controls");
        controls
    }

    /// UVC autofocus is continuous, so Auto and Continuous share one control
    pub fn focus_modes(&self) -> Vec<FocusMode> {
        match (&self.focus_auto, &self.focus_absolute) {
            (Some(_), _) => vec![FocusMode::Auto, FocusMode::Continuous, FocusMode::Manual],
            (None, Some(_)) => vec![FocusMode::Manual],
            (None, None) => Vec::new(),
        }
    }

    /// Presets are emulated through the colour temperature control
    pub fn white_balance_modes(&self) -> Vec<WhiteBalance> {
        let mut modes = Vec::new();
        if self.auto_white_balance.is_some() {
            modes.push(WhiteBalance::Auto);
        }
        if let Some(temperature) = &self.white_balance_temperature {
            modes.extend(WhiteBalance::ALL.into_iter().filter(|mode| {
                mode.kelvin().is_some_and(|k| {
                    (temperature.minimum..=temperature.maximum).contains(&(k as i32))
                })
            }));
        }
        modes
    }

    pub fn zoom_range(&self) -> ZoomRange {
        match &self.zoom {
            Some(zoom) if zoom.maximum > zoom.minimum => ZoomRange {
                min: 1.0,
                max: zoom_max_ratio(zoom),
            },
            _ => ZoomRange::FIXED,
        }
    }

    /// Exposure index counts control steps
    pub fn exposure_range(&self) -> ExposureRange {
        match &self.exposure_bias {
            Some(bias) if bias.maximum > bias.minimum => {
                let step = bias.step.max(1);
                ExposureRange {
                    min: bias.minimum / step,
                    max: bias.maximum / step,
                    step_ev: step as f32 / EXPOSURE_BIAS_UNITS_PER_EV,
                }
            }
            _ => ExposureRange::UNSUPPORTED,
        }
    }

    /// Control writes for a negotiated snapshot, in the order to apply them
    pub fn control_values(&self, settings: &CaptureSettings) -> Vec<(u32, i32)> {
        let mut values = Vec::new();

        if let Some(zoom) = &self.zoom {
            values.push((zoom.id, zoom_to_control(zoom, settings.zoom_ratio)));
        }

        if self.focus_auto.is_some() {
            let auto = settings.focus_mode != FocusMode::Manual;
            values.push((V4L2_CID_FOCUS_AUTO, i32::from(auto)));
        }

        if let Some(bias) = &self.exposure_bias {
            let step = bias.step.max(1);
            values.push((
                bias.id,
                bias.clamp(settings.exposure_index.saturating_mul(step)),
            ));
        }

        match settings.white_balance.kelvin() {
            None => {
                if self.auto_white_balance.is_some() {
                    values.push((V4L2_CID_AUTO_WHITE_BALANCE, 1));
                }
            }
            Some(kelvin) => {
                if self.auto_white_balance.is_some() {
                    values.push((V4L2_CID_AUTO_WHITE_BALANCE, 0));
                }
                if let Some(temperature) = &self.white_balance_temperature {
                    values.push((temperature.id, temperature.clamp(kelvin as i32)));
                }
            }
        }

        values
    }
}

fn zoom_max_ratio(zoom: &ControlInfo) -> f32 {
    if zoom.minimum > 0 {
        zoom.maximum as f32 / zoom.minimum as f32
    } else {
        1.0 + (zoom.maximum - zoom.minimum) as f32 / ZOOM_UNITS_PER_RATIO
    }
}

/// Map a ratio in `[1.0, max_ratio]` linearly onto the control range
fn zoom_to_control(zoom: &ControlInfo, ratio: f32) -> i32 {
    let max_ratio = zoom_max_ratio(zoom);
    if max_ratio <= 1.0 {
        return zoom.minimum;
    }
    let fraction = ((ratio - 1.0) / (max_ratio - 1.0)).clamp(0.0, 1.0);
    let span = (zoom.maximum - zoom.minimum) as f32;
    zoom.clamp(zoom.minimum + (fraction * span).round() as i32)
}

/// Write a batch of controls, restoring the previous values on failure
pub fn apply_controls(device_path: &str, values: &[(u32, i32)]) -> HardwareResult<()> {
    let mut written: Vec<(u32, i32)> = Vec::with_capacity(values.len());

    for &(id, value) in values {
        let previous = get_control(device_path, id);
        if let Err(e) = set_control(device_path, id, value) {
            for &(id, old) in written.iter().rev() {
                let _ = set_control(device_path, id, old);
            }
            return Err(e);
        }
        if let Some(old) = previous {
            written.push((id, old));
        }
    }

    Ok(())
}
