//! Gradient-voting Hough accumulation for gauge-face centers.
//!
//! Every pixel with a strong gradient casts votes along its gradient
//! direction at each radius in `[r_min, r_max]`. Edges of a circular rim have
//! radial gradients, so their votes converge on the rim's center.

use image::{GrayImage, ImageBuffer, Luma};

/// One above-threshold gradient sample.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgePixel {
    pub x: f32,
    pub y: f32,
    pub gx: f32,
    pub gy: f32,
    pub mag: f32,
}

impl EdgePixel {
    /// |cos| of the angle between the gradient and the offset from `(cx, cy)`.
    #[inline]
    pub fn radial_alignment(&self, cx: f32, cy: f32) -> Option<(f32, f32)> {
        let vx = self.x - cx;
        let vy = self.y - cy;
        let d = (vx * vx + vy * vy).sqrt();
        if d < 1e-3 {
            return None;
        }
        let cos = (self.gx * vx + self.gy * vy).abs() / (self.mag * d);
        Some((d, cos))
    }
}

/// Scharr-gradient edge pixels above `grad_threshold * max_magnitude`.
///
/// Returns an empty list when the strongest gradient is below `min_gradient`
/// (e.g. a uniform image).
pub(crate) fn edge_pixels(
    smoothed: &GrayImage,
    grad_threshold: f32,
    min_gradient: f32,
) -> Vec<EdgePixel> {
    let (w, h) = smoothed.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }
    let gx = imageproc::gradients::horizontal_scharr(smoothed);
    let gy = imageproc::gradients::vertical_scharr(smoothed);
    let gx_raw = gx.as_raw();
    let gy_raw = gy.as_raw();

    let mut max_mag_sq: f32 = 0.0;
    for (&gxv, &gyv) in gx_raw.iter().zip(gy_raw.iter()) {
        let (gxv, gyv) = (gxv as f32, gyv as f32);
        max_mag_sq = max_mag_sq.max(gxv * gxv + gyv * gyv);
    }
    let max_mag = max_mag_sq.sqrt();
    if max_mag < min_gradient.max(1e-6) {
        return Vec::new();
    }
    let threshold = grad_threshold * max_mag;
    let threshold_sq = threshold * threshold;

    let stride = w as usize;
    let mut edges = Vec::new();
    for (idx, (&gxv, &gyv)) in gx_raw.iter().zip(gy_raw.iter()).enumerate() {
        let (gxv, gyv) = (gxv as f32, gyv as f32);
        let mag_sq = gxv * gxv + gyv * gyv;
        if mag_sq < threshold_sq || mag_sq == 0.0 {
            continue;
        }
        edges.push(EdgePixel {
            x: (idx % stride) as f32,
            y: (idx / stride) as f32,
            gx: gxv,
            gy: gyv,
            mag: mag_sq.sqrt(),
        });
    }
    edges
}

/// A local maximum of the smoothed center accumulator.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CenterPeak {
    /// Sub-pixel X of the peak (3x3 weighted centroid).
    pub x: f32,
    /// Sub-pixel Y of the peak.
    pub y: f32,
    /// Smoothed accumulator value at the peak.
    pub score: f32,
}

/// Deposit a weighted vote into the accumulator using bilinear interpolation.
#[inline]
fn bilinear_add_in_bounds(accum: &mut [f32], stride: usize, x: f32, y: f32, weight: f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let base = y0 * stride + x0;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

/// Parameters of one center-voting pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VoteParams {
    pub r_min: f32,
    pub r_max: f32,
    pub accum_sigma: f32,
    pub nms_radius: f32,
    pub max_peaks: usize,
}

/// Accumulate center votes and return the strongest peaks, highest first.
pub(crate) fn vote_centers(
    w: u32,
    h: u32,
    edges: &[EdgePixel],
    params: &VoteParams,
) -> Vec<CenterPeak> {
    if w < 4 || h < 4 || edges.is_empty() || params.r_max < params.r_min {
        return Vec::new();
    }
    let stride = w as usize;
    let mut accum = vec![0.0f32; stride * h as usize];
    let mut radii = Vec::new();
    let mut r = params.r_min;
    while r <= params.r_max {
        radii.push(r);
        r += 1.0;
    }
    let x_limit = (w - 1) as f32;
    let y_limit = (h - 1) as f32;

    for e in edges {
        let dx = e.gx / e.mag;
        let dy = e.gy / e.mag;
        // The rim may be darker or brighter than the face, so vote both ways.
        for &r in &radii {
            for sign in [1.0f32, -1.0] {
                let vx = e.x + sign * dx * r;
                let vy = e.y + sign * dy * r;
                if vx >= 0.0 && vx < x_limit && vy >= 0.0 && vy < y_limit {
                    bilinear_add_in_bounds(&mut accum, stride, vx, vy, 1.0);
                }
            }
        }
    }

    let Some(accum_img) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum) else {
        return Vec::new();
    };
    let smoothed = if params.accum_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&accum_img, params.accum_sigma)
    } else {
        accum_img
    };
    find_peaks(smoothed.as_raw(), w, h, params.nms_radius, params.max_peaks)
}

fn find_peaks(
    data: &[f32],
    w: u32,
    h: u32,
    nms_radius: f32,
    max_peaks: usize,
) -> Vec<CenterPeak> {
    let stride = w as usize;
    let max_val = data.iter().cloned().fold(0.0f32, f32::max);
    if max_val < 1e-6 {
        return Vec::new();
    }
    let nms_r = nms_radius.ceil().max(1.0) as i32;
    let nms_r_sq = nms_radius * nms_radius;
    let mut nms_offsets = Vec::new();
    for dy in -nms_r..=nms_r {
        for dx in -nms_r..=nms_r {
            if (dx == 0 && dy == 0) || (dx * dx + dy * dy) as f32 > nms_r_sq {
                continue;
            }
            nms_offsets.push(dy as isize * stride as isize + dx as isize);
        }
    }

    let mut peaks = Vec::new();
    for y in nms_r..(h as i32 - nms_r) {
        for x in nms_r..(w as i32 - nms_r) {
            let idx = y as usize * stride + x as usize;
            let val = data[idx];
            if val <= 0.0 {
                continue;
            }
            let is_max = nms_offsets.iter().all(|&off| {
                let nidx = idx.wrapping_add_signed(off);
                !(data[nidx] > val || (data[nidx] == val && nidx < idx))
            });
            if is_max {
                let (px, py) = centroid_3x3(data, stride, x as usize, y as usize);
                peaks.push(CenterPeak {
                    x: px,
                    y: py,
                    score: val,
                });
            }
        }
    }

    peaks.sort_by(|a, b| b.score.total_cmp(&a.score));
    peaks.truncate(max_peaks);
    peaks
}

/// Weighted centroid of the 3x3 neighborhood; callers keep `x`, `y` off the border.
fn centroid_3x3(data: &[f32], stride: usize, x: usize, y: usize) -> (f32, f32) {
    let mut sw = 0.0f32;
    let mut sx = 0.0f32;
    let mut sy = 0.0f32;
    for yy in (y - 1)..=(y + 1) {
        for xx in (x - 1)..=(x + 1) {
            let v = data[yy * stride + xx];
            sw += v;
            sx += v * xx as f32;
            sy += v * yy as f32;
        }
    }
    if sw > 0.0 {
        (sx / sw, sy / sw)
    } else {
        (x as f32, y as f32)
    }
}
