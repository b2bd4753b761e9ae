//! Grayscale normalization and smoothing.
//!
//! Every transform returns a new buffer; the input image is never modified.

use image::{DynamicImage, GrayImage};

/// Options applied when building the pipeline's grayscale working image.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Histogram-equalize the grayscale image before any stage runs.
    pub equalize_histogram: bool,
}

/// Collapse any supported pixel format to 8-bit luma.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Gaussian smoothing; a non-positive sigma returns an unmodified copy.
pub fn smooth(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 && sigma.is_finite() {
        imageproc::filter::gaussian_blur_f32(gray, sigma)
    } else {
        gray.clone()
    }
}

/// Grayscale working image for the whole pipeline.
pub fn normalize(image: &DynamicImage, config: &PreprocessConfig) -> GrayImage {
    let gray = to_grayscale(image);
    if config.equalize_histogram {
        imageproc::contrast::equalize_histogram(&gray)
    } else {
        gray
    }
}

/// Mean, min and max intensity of a grayscale image.
pub fn intensity_stats(gray: &GrayImage) -> (f32, u8, u8) {
    let raw = gray.as_raw();
    if raw.is_empty() {
        return (0.0, 0, 0);
    }
    let mut sum = 0u64;
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    for &v in raw {
        sum += v as u64;
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (sum as f32 / raw.len() as f32, lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn rgb_converts_to_luma() {
        let mut rgb = RgbImage::new(4, 4);
        rgb.put_pixel(1, 1, Rgb([255, 255, 255]));
        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.dimensions(), (4, 4));
        assert_eq!(gray.get_pixel(1, 1)[0], 255);
        assert_eq!(gray.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn smoothing_spreads_a_point_without_touching_input() {
        let mut gray = GrayImage::new(9, 9);
        gray.put_pixel(4, 4, Luma([255]));
        let blurred = smooth(&gray, 1.0);
        assert_eq!(gray.get_pixel(4, 4)[0], 255);
        assert!(blurred.get_pixel(4, 4)[0] < 255);
        assert!(blurred.get_pixel(5, 4)[0] > 0);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let gray = GrayImage::from_pixel(3, 3, Luma([17]));
        assert_eq!(smooth(&gray, 0.0), gray);
    }

    #[test]
    fn stats_report_range() {
        let mut gray = GrayImage::from_pixel(2, 2, Luma([100]));
        gray.put_pixel(0, 0, Luma([0]));
        gray.put_pixel(1, 1, Luma([200]));
        let (mean, lo, hi) = intensity_stats(&gray);
        assert_eq!((lo, hi), (0, 200));
        assert!((mean - 100.0).abs() < 1e-6);
    }
}
