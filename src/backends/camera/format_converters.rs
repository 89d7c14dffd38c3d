// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for still capture
//!
//! Both backends produce packed YUYV when the device can not hand out JPEG
//! directly; these helpers turn that into RGB for the encoder.

use super::types::WhiteBalance;

/// Convert YUYV (YUV 4:2:2) to packed RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion. Missing trailing
/// pixels (short buffers from the driver) are left black.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    'outer: for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break 'outer;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb.resize(pixel_count * 3, 0);
    rgb
}

/// Per-channel gains that mimic a white balance preset on neutral input
///
/// Warm light (incandescent) needs the blue channel lifted, cool light
/// (cloudy) needs red lifted.
pub fn white_balance_gains(mode: WhiteBalance) -> [f32; 3] {
    match mode {
        WhiteBalance::Auto => [1.0, 1.0, 1.0],
        WhiteBalance::Daylight => [1.05, 1.0, 0.95],
        WhiteBalance::Cloudy => [1.12, 1.0, 0.88],
        WhiteBalance::Incandescent => [0.80, 1.0, 1.25],
        WhiteBalance::Fluorescent => [0.92, 1.0, 1.08],
    }
}

/// Scale packed RGB in place by per-channel gains
pub fn apply_gains(rgb: &mut [u8], gains: [f32; 3]) {
    if gains == [1.0, 1.0, 1.0] {
        return;
    }
    for pixel in rgb.chunks_exact_mut(3) {
        for (channel, gain) in pixel.iter_mut().zip(gains) {
            *channel = (*channel as f32 * gain).clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_stays_grey() {
        // Two mid-grey pixels (U=V=128)
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128], 2, 1);
        assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
    }

    #[test]
    fn test_yuyv_short_buffer_is_padded() {
        let rgb = yuyv_to_rgb(&[255, 128, 255, 128], 4, 1);
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[6..], &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_gains_shift_channels() {
        let mut rgb = vec![100, 100, 100];
        apply_gains(&mut rgb, white_balance_gains(WhiteBalance::Incandescent));
        assert!(rgb[0] < 100);
        assert_eq!(rgb[1], 100);
        assert!(rgb[2] > 100);
    }
}
