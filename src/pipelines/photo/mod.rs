// SPDX-License-Identifier: MPL-2.0

//! Still photo rendering
//!
//! ```text
//! YUYV / RGB frame → Post-Processing → JPEG Encoding → CapturedImage
//! ```
//!
//! Used by backends whose device can not produce a finished JPEG (the
//! virtual camera and YUYV-only V4L2 devices).

pub mod encoding;
pub mod processing;

pub use encoding::{EncodingQuality, capture_file_name, encode_jpeg};
pub use processing::{PostProcessingConfig, PostProcessor};

use crate::backends::camera::format_converters::yuyv_to_rgb;
use image::RgbImage;

/// Convert a packed YUYV frame, post-process and encode it
///
/// # Returns
/// * `Ok(Vec<u8>)` - JPEG bytes
/// * `Err(String)` - Frame size mismatch or encoder error
pub fn render_yuyv_still(
    yuyv: &[u8],
    width: u32,
    height: u32,
    config: PostProcessingConfig,
    quality: EncodingQuality,
) -> Result<Vec<u8>, String> {
    let rgb = yuyv_to_rgb(yuyv, width, height);
    let image = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| format!("Frame buffer does not match {}x{}", width, height))?;
    let image = PostProcessor::new(config).process(image);
    encode_jpeg(&image, quality)
}
