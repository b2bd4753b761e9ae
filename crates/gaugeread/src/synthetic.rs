//! Deterministic synthetic gauge images for tests, benchmarks and the CLI.

use image::{GrayImage, Luma};

use crate::circle::Circle;
use crate::geometry::to_math_convention;

/// Render an annulus `r_inner <= d <= r_outer` of `ring_pix` on a `bg_pix` background.
pub fn ring_image(
    w: u32,
    h: u32,
    center: [f32; 2],
    r_outer: f32,
    r_inner: f32,
    ring_pix: u8,
    bg_pix: u8,
) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - center[0];
        let dy = y as f32 - center[1];
        let d = (dx * dx + dy * dy).sqrt();
        if d >= r_inner && d <= r_outer {
            Luma([ring_pix])
        } else {
            Luma([bg_pix])
        }
    })
}

/// A simple dial: bright face, dark rim, tick marks, hub and one needle.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyntheticGauge {
    pub width: u32,
    pub height: u32,
    pub center: [f32; 2],
    /// Rim centerline radius.
    pub radius: f32,
    /// Needle direction, math convention (Y up).
    pub needle_math_deg: f64,
    /// Needle length as a fraction of `radius`.
    pub needle_length_frac: f32,
    pub needle_half_width: f32,
    /// Ticks spread evenly over the 7 o'clock to 5 o'clock sweep; 0 disables them.
    pub tick_count: usize,
    pub rim_half_width: f32,
    pub hub_radius: f32,
    pub face_intensity: u8,
    pub rim_intensity: u8,
    pub background_intensity: u8,
    pub needle_intensity: u8,
    pub tick_intensity: u8,
    /// Standard deviation of additive Gaussian noise; 0 disables it.
    pub noise_sigma: f64,
    pub seed: u64,
}

impl Default for SyntheticGauge {
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            center: [120.0, 120.0],
            radius: 80.0,
            needle_math_deg: 90.0,
            needle_length_frac: 0.85,
            needle_half_width: 2.0,
            tick_count: 11,
            rim_half_width: 3.0,
            hub_radius: 5.0,
            face_intensity: 235,
            rim_intensity: 40,
            background_intensity: 150,
            needle_intensity: 30,
            tick_intensity: 60,
            noise_sigma: 0.0,
            seed: 7,
        }
    }
}

/// Whether `(px, py)` lies on the segment from `c` along `dir` between
/// `t_min` and `t_max` within `half_width`.
fn on_segment(
    px: f32,
    py: f32,
    c: [f32; 2],
    dir: [f32; 2],
    t_min: f32,
    t_max: f32,
    half_width: f32,
) -> bool {
    let vx = px - c[0];
    let vy = py - c[1];
    let t = vx * dir[0] + vy * dir[1];
    let perp = (vx * dir[1] - vy * dir[0]).abs();
    t >= t_min && t <= t_max && perp <= half_width
}

/// Unit image-space direction of a math-convention angle.
fn image_dir(math_deg: f64) -> [f32; 2] {
    let (s, c) = math_deg.to_radians().sin_cos();
    [c as f32, -s as f32]
}

impl SyntheticGauge {
    /// The exact face circle this gauge is drawn with.
    pub fn circle(&self) -> Circle {
        Circle {
            center_x: self.center[0] as f64,
            center_y: self.center[1] as f64,
            radius: self.radius as f64,
            coverage: 1.0,
            votes: 0,
        }
    }

    pub fn render(&self) -> GrayImage {
        let c = self.center;
        let r = self.radius;
        let needle_dir = image_dir(self.needle_math_deg);
        let needle_len = self.needle_length_frac * r;
        let tick_dirs: Vec<[f32; 2]> = match self.tick_count {
            0 => Vec::new(),
            1 => vec![image_dir(to_math_convention(210.0))],
            n => (0..n)
                .map(|k| {
                    let clock = 210.0 + 300.0 * k as f64 / (n - 1) as f64;
                    image_dir(to_math_convention(clock))
                })
                .collect(),
        };

        let mut img = GrayImage::from_fn(self.width, self.height, |x, y| {
            let (px, py) = (x as f32, y as f32);
            let d = ((px - c[0]).powi(2) + (py - c[1]).powi(2)).sqrt();
            let v = if (d - r).abs() <= self.rim_half_width {
                self.rim_intensity
            } else if d > r {
                self.background_intensity
            } else if d <= self.hub_radius
                || on_segment(px, py, c, needle_dir, 0.0, needle_len, self.needle_half_width)
            {
                self.needle_intensity
            } else if tick_dirs
                .iter()
                .any(|&dir| on_segment(px, py, c, dir, 0.86 * r, 0.95 * r, 1.0))
            {
                self.tick_intensity
            } else {
                self.face_intensity
            };
            Luma([v])
        });

        if self.noise_sigma > 0.0 {
            imageproc::noise::gaussian_noise_mut(&mut img, 0.0, self.noise_sigma, self.seed);
        }
        img
    }
}
