//! Sub-pixel sampling along rays cast from the gauge center.

use image::GrayImage;

/// Bilinear intensity at a sub-pixel position, in `[0, 255]`.
///
/// Returns `None` when any of the four neighbours falls outside the image.
#[inline]
pub fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 || !(x >= 0.0 && y >= 0.0) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 >= w - 1 || y0 >= h - 1 {
        return None;
    }

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = w as usize;
    let idx00 = y0 as usize * stride + x0 as usize;
    let raw = img.as_raw();
    let p00 = raw[idx00] as f32;
    let p10 = raw[idx00 + 1] as f32;
    let p01 = raw[idx00 + stride] as f32;
    let p11 = raw[idx00 + stride + 1] as f32;

    Some(
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11,
    )
}

/// Image position at math angle `angle_deg` and distance `r` from `center`.
///
/// Image rows grow downward, so the Y component is subtracted.
#[inline]
pub fn ray_point(center: [f32; 2], r: f32, angle_deg: f64) -> [f32; 2] {
    let (s, c) = angle_deg.to_radians().sin_cos();
    [center[0] + r * c as f32, center[1] - r * s as f32]
}

/// Intensity statistics of one ray between the inner and outer radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayProfile {
    /// Mean intensity of the in-bounds samples.
    pub mean: f32,
    /// Fraction of in-bounds samples brighter than the gap threshold.
    pub gap_fraction: f32,
    /// In-bounds samples taken.
    pub sample_count: usize,
    /// Samples the ray would have inside an unbounded image.
    pub expected_count: usize,
}

/// Geometry shared by every ray of one scan.
#[derive(Debug, Clone, Copy)]
pub struct RayGeometry {
    pub center: [f32; 2],
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub step: f32,
}

impl RayGeometry {
    pub fn expected_samples(&self) -> usize {
        if self.outer_radius < self.inner_radius || self.step <= 0.0 {
            return 0;
        }
        ((self.outer_radius - self.inner_radius) / self.step).floor() as usize + 1
    }
}

/// Sample one ray; pixels outside the image are skipped, not zero-filled.
pub fn sample_ray(
    img: &GrayImage,
    geom: &RayGeometry,
    angle_deg: f64,
    gap_intensity: f32,
) -> RayProfile {
    let expected = geom.expected_samples();
    let mut sum = 0.0f32;
    let mut gaps = 0usize;
    let mut n = 0usize;
    for i in 0..expected {
        let r = geom.inner_radius + i as f32 * geom.step;
        let [x, y] = ray_point(geom.center, r, angle_deg);
        if let Some(v) = bilinear_sample(img, x, y) {
            sum += v;
            n += 1;
            if v > gap_intensity {
                gaps += 1;
            }
        }
    }
    if n == 0 {
        return RayProfile {
            mean: 0.0,
            gap_fraction: 0.0,
            sample_count: 0,
            expected_count: expected,
        };
    }
    RayProfile {
        mean: sum / n as f32,
        gap_fraction: gaps as f32 / n as f32,
        sample_count: n,
        expected_count: expected,
    }
}
