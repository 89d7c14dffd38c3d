// SPDX-License-Identifier: MPL-2.0

//! Post-processing for software-rendered stills
//!
//! Cameras without the matching hardware control get the effect of a
//! settings snapshot applied to the RGB frame instead:
//! - digital zoom (centre crop scaled back to full size)
//! - white balance preset gains
//! - exposure bias as a brightness shift

use crate::backends::camera::format_converters::{apply_gains, white_balance_gains};
use crate::backends::camera::types::CaptureSettings;
use image::RgbImage;
use image::imageops::{self, FilterType};

/// Post-processing configuration derived from a settings snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessingConfig {
    /// Digital zoom ratio (1.0 = no crop)
    pub zoom_ratio: f32,
    /// Per-channel gains for white balance
    pub gains: [f32; 3],
    /// Exposure bias in EV
    pub exposure_ev: f32,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            zoom_ratio: 1.0,
            gains: [1.0, 1.0, 1.0],
            exposure_ev: 0.0,
        }
    }
}

impl PostProcessingConfig {
    /// Build the config for a negotiated snapshot
    ///
    /// # Arguments
    /// * `settings` - Negotiated settings
    /// * `step_ev` - Size of one exposure index step in EV
    pub fn from_settings(settings: &CaptureSettings, step_ev: f32) -> Self {
        Self {
            zoom_ratio: settings.zoom_ratio.max(1.0),
            gains: white_balance_gains(settings.white_balance),
            exposure_ev: settings.exposure_index as f32 * step_ev,
        }
    }
}

/// Post-processor for captured frames
pub struct PostProcessor {
    config: PostProcessingConfig,
}

impl PostProcessor {
    pub fn new(config: PostProcessingConfig) -> Self {
        Self { config }
    }

    /// Apply zoom, white balance and exposure to an RGB frame
    pub fn process(&self, mut image: RgbImage) -> RgbImage {
        if self.config.zoom_ratio > 1.0 {
            image = digital_zoom(&image, self.config.zoom_ratio);
        }

        let exposure_gain = 2f32.powf(self.config.exposure_ev);
        let gains = self.config.gains.map(|gain| gain * exposure_gain);
        apply_gains(&mut image, gains);
        image
    }
}

/// Crop the centre `1/ratio` of the frame and scale it back up
fn digital_zoom(image: &RgbImage, ratio: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let crop_w = ((width as f32 / ratio).round() as u32).clamp(1, width);
    let crop_h = ((height as f32 / ratio).round() as u32).clamp(1, height);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;

    let cropped = imageops::crop_imm(image, x, y, crop_w, crop_h).to_image();
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}
