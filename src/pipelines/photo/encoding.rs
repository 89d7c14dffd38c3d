// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! Turns processed RGB frames into JPEG bytes and names capture files.
//! Called by backends while they produce a still.

use crate::constants::{CAPTURE_FILE_EXTENSION, CAPTURE_FILENAME_FORMAT, DEFAULT_JPEG_QUALITY};
use chrono::{DateTime, Local};
use image::RgbImage;
use tracing::debug;

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingQuality {
    /// Low quality (high compression)
    Low,
    /// Medium quality (balanced)
    Medium,
    /// High quality (low compression)
    #[default]
    High,
    /// Maximum quality (minimal compression)
    Maximum,
}

impl EncodingQuality {
    /// Get JPEG quality value (0-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => DEFAULT_JPEG_QUALITY,
            EncodingQuality::Maximum => 98,
        }
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: EncodingQuality) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality.jpeg_quality());

    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;

    debug!(
        width = image.width(),
        height = image.height(),
        bytes = buffer.len(),
        "Encoded JPEG"
    );
    Ok(buffer)
}

/// File name for a still taken at `at`, e.g. `2024-05-01-13-45-10-123.jpg`
pub fn capture_file_name(at: DateTime<Local>) -> String {
    format!(
        "{}.{}",
        at.format(CAPTURE_FILENAME_FORMAT),
        CAPTURE_FILE_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_jpeg_quality_values() {
        assert_eq!(EncodingQuality::Low.jpeg_quality(), 60);
        assert_eq!(EncodingQuality::Medium.jpeg_quality(), 80);
        assert_eq!(EncodingQuality::High.jpeg_quality(), 92);
        assert_eq!(EncodingQuality::Maximum.jpeg_quality(), 98);
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg() {
        let image = RgbImage::from_pixel(16, 8, image::Rgb([200, 100, 50]));
        let bytes = encode_jpeg(&image, EncodingQuality::High).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_capture_file_name_has_millis() {
        let at = Local
            .with_ymd_and_hms(2024, 5, 1, 13, 45, 10)
            .unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(capture_file_name(at), "2024-05-01-13-45-10-123.jpg");
    }
}
