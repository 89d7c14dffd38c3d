// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic YUYV frames for the virtual camera

/// Test pattern types for frame generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// SMPTE color bars
    ColorBars,
    /// Horizontal gradient from dark to light
    Gradient,
}

/// Generate a packed YUYV frame (2 bytes per pixel)
pub fn generate_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let mut data = vec![0u8; (width as usize) * (height as usize) * 2];
    match pattern {
        TestPattern::ColorBars => fill_color_bars(&mut data, width, height),
        TestPattern::Gradient => fill_gradient(&mut data, width, height),
    }
    data
}

fn fill_color_bars(data: &mut [u8], width: u32, height: u32) {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black as (Y, U, V)
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];
    let bar_width = (width / 8).max(1);

    fill_pairs(data, width, height, |x, _| BARS[((x / bar_width) as usize).min(7)]);
}

fn fill_gradient(data: &mut [u8], width: u32, height: u32) {
    let span = width.saturating_sub(1).max(1);
    fill_pairs(data, width, height, |x, _| {
        let y = 16 + (x * 219 / span) as u8;
        (y, 128, 128)
    });
}

/// Write one (Y, U, V) triple per horizontal pixel pair
fn fill_pairs(data: &mut [u8], width: u32, height: u32, color: impl Fn(u32, u32) -> (u8, u8, u8)) {
    for y in 0..height {
        for x in (0..width).step_by(2) {
            let (y_val, u_val, v_val) = color(x, y);
            let offset = ((y * width + x) * 2) as usize;
            if let Some(px) = data.get_mut(offset..offset + 4) {
                px.copy_from_slice(&[y_val, u_val, y_val, v_val]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_bars_pattern() {
        let data = generate_frame(64, 8, TestPattern::ColorBars);
        assert_eq!(data.len(), 64 * 8 * 2);
        // First bar is white, last bar is black
        assert_eq!(data[0], 235);
        assert_eq!(data[(63 - 1) * 2], 16);
    }

    #[test]
    fn test_gradient_pattern() {
        let data = generate_frame(64, 2, TestPattern::Gradient);
        assert!(data[0] < 20);
        assert!(data[(62) * 2] > 200);
    }
}
