//! Screen frame scaling and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

/// Errors raised while preparing a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("scale must be a finite value in (0, 1], got {0}")]
    InvalidScale(f64),
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Resampling used when shrinking a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resample {
    Bilinear,
    Nearest,
}

impl Resample {
    /// Nearest-neighbour below half size, where the quality loss is invisible
    /// on a phone preview and the resize is much cheaper.
    pub fn for_preview(scale: f64) -> Self {
        if scale >= 0.5 {
            Self::Bilinear
        } else {
            Self::Nearest
        }
    }

    fn filter(self) -> FilterType {
        match self {
            Self::Bilinear => FilterType::Triangle,
            Self::Nearest => FilterType::Nearest,
        }
    }
}

/// Validated encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    quality: u8,
    scale: f64,
}

impl FrameSettings {
    /// Clamps `quality` into 1..=100 and `scale` above 1 down to 1.
    ///
    /// # Errors
    /// Returns [`FrameError::InvalidScale`] for non-finite or non-positive
    /// scales.
    pub fn new(quality: i64, scale: f64) -> Result<Self, FrameError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FrameError::InvalidScale(scale));
        }
        Ok(Self {
            quality: quality.clamp(1, 100) as u8,
            scale: scale.min(1.0),
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// A compressed frame plus the geometry needed to map taps back to the
/// full-resolution screen.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Scales a capture (when `scale < 1`) and encodes it as JPEG.
pub fn encode(
    capture: RgbaImage,
    settings: FrameSettings,
    resample: Resample,
) -> Result<EncodedFrame, FrameError> {
    let (original_width, original_height) = capture.dimensions();
    let mut rgb = DynamicImage::ImageRgba8(capture).into_rgb8();

    if settings.scale < 1.0 {
        let width = scaled(original_width, settings.scale);
        let height = scaled(original_height, settings.scale);
        rgb = imageops::resize(&rgb, width, height, resample.filter());
    }

    let (width, height) = rgb.dimensions();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, settings.quality).encode(
        rgb.as_raw(),
        width,
        height,
        image::ColorType::Rgb8.into(),
    )?;

    Ok(EncodedFrame {
        jpeg,
        width,
        height,
        original_width,
        original_height,
    })
}

fn scaled(dimension: u32, scale: f64) -> u32 {
    ((dimension as f64 * scale) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rstest::rstest;

    fn capture(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]))
    }

    #[rstest]
    #[case(1.0, 200, 100)]
    #[case(0.5, 100, 50)]
    #[case(0.25, 50, 25)]
    fn encode_scales_dimensions(#[case] scale: f64, #[case] width: u32, #[case] height: u32) {
        let settings = FrameSettings::new(60, scale).expect("valid settings");
        let frame = encode(capture(200, 100), settings, Resample::for_preview(scale))
            .expect("encode frame");

        assert_eq!((frame.width, frame.height), (width, height));
        assert_eq!((frame.original_width, frame.original_height), (200, 100));
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8], "jpeg start-of-image marker");
    }

    #[test]
    fn tiny_scale_keeps_at_least_one_pixel() {
        let settings = FrameSettings::new(50, 0.001).expect("valid settings");
        let frame = encode(capture(10, 10), settings, Resample::Nearest).expect("encode frame");
        assert_eq!((frame.width, frame.height), (1, 1));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.5)]
    #[case(f64::NAN)]
    fn settings_reject_unusable_scale(#[case] scale: f64) {
        assert!(matches!(
            FrameSettings::new(50, scale),
            Err(FrameError::InvalidScale(_))
        ));
    }

    #[test]
    fn settings_clamp_quality_and_scale() {
        let settings = FrameSettings::new(400, 3.0).expect("valid settings");
        assert_eq!(settings.quality(), 100);
        assert_eq!(settings.scale(), 1.0);
        assert_eq!(FrameSettings::new(-3, 0.5).expect("valid").quality(), 1);
    }

    #[test]
    fn preview_resampling_switches_at_half_scale() {
        assert_eq!(Resample::for_preview(0.5), Resample::Bilinear);
        assert_eq!(Resample::for_preview(0.3), Resample::Nearest);
    }
}
