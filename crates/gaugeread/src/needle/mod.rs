//! Needle angle detection by radial darkness scan.
//!
//! Every coarse angle casts a ray from the hub exclusion radius to the outer
//! sampling radius. A ray's score is its mean intensity plus a penalty for
//! bright gaps, so lower is better and a solid dark needle wins over a ray
//! that crosses printed markings. The best coarse angle is then refined on a
//! sub-degree grid.
//!
//! All angles are in the math convention measured with the image Y axis
//! flipped (see [`ray::ray_point`]).

pub mod ray;

use image::GrayImage;

use crate::circle::Circle;
use crate::error::{GaugeError, GaugeResult};
use crate::geometry::{angular_distance, normalize_degrees};

use ray::RayGeometry;

/// Configuration for the needle scan.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NeedleDetectorConfig {
    /// Hub exclusion radius as a fraction of the gauge radius.
    pub inner_radius_frac: f32,
    /// Lower bound on the hub exclusion radius (pixels).
    pub min_inner_radius_px: f32,
    /// Outer sampling radius as a fraction of the gauge radius.
    pub outer_radius_frac: f32,
    /// Distance between samples along a ray (pixels).
    pub sample_step_px: f32,
    /// Angular step of the coarse scan (degrees).
    pub coarse_step_deg: f64,
    /// Half-width of the refinement window around the coarse angle (degrees).
    pub refine_window_deg: f64,
    /// Angular step of the refinement scan (degrees).
    pub refine_step_deg: f64,
    /// Samples brighter than this count as gaps in the needle.
    pub gap_intensity: f32,
    /// Score added for a ray that is all gaps.
    pub gap_penalty: f32,
    /// Minimum fraction of a ray's samples that must land inside the image.
    pub min_valid_fraction: f32,
    /// Number of coarse candidates kept for diagnostics.
    pub top_k: usize,
    /// Lower bound on the plateau margin (score units).
    pub plateau_tolerance: f32,
    /// Plateau margin as a fraction of the needle contrast, i.e. the median
    /// coarse score minus the best one. Scores within the margin of the
    /// minimum belong to the same plateau.
    pub plateau_contrast_frac: f32,
    /// Minimum angular distance (degrees) between the best and runner-up rays.
    pub runner_up_separation_deg: f64,
    /// Best score above this is "too bright" to be a needle.
    pub too_bright_score: f32,
    /// Confidence below this flags the detection as low confidence.
    pub min_confidence: f32,
}

impl Default for NeedleDetectorConfig {
    fn default() -> Self {
        Self {
            inner_radius_frac: 0.15,
            min_inner_radius_px: 5.0,
            outer_radius_frac: 0.8,
            sample_step_px: 1.0,
            coarse_step_deg: 1.0,
            refine_window_deg: 3.0,
            refine_step_deg: 0.1,
            gap_intensity: 128.0,
            gap_penalty: 64.0,
            min_valid_fraction: 0.5,
            top_k: 10,
            plateau_tolerance: 1.0,
            plateau_contrast_frac: 0.05,
            runner_up_separation_deg: 15.0,
            too_bright_score: 200.0,
            min_confidence: 0.2,
        }
    }
}

impl NeedleDetectorConfig {
    fn validate(&self) -> GaugeResult<()> {
        let positive = [
            ("needle.sample_step_px", self.sample_step_px as f64),
            ("needle.coarse_step_deg", self.coarse_step_deg),
            ("needle.refine_step_deg", self.refine_step_deg),
            ("needle.outer_radius_frac", self.outer_radius_frac as f64),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(GaugeError::invalid_config(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        if self.coarse_step_deg > 90.0 {
            return Err(GaugeError::invalid_config(
                "needle.coarse_step_deg must be at most 90",
            ));
        }
        if !(self.refine_window_deg >= 0.0) {
            return Err(GaugeError::invalid_config(
                "needle.refine_window_deg must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.plateau_contrast_frac) {
            return Err(GaugeError::invalid_config(
                "needle.plateau_contrast_frac must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_valid_fraction) {
            return Err(GaugeError::invalid_config(
                "needle.min_valid_fraction must be in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Hub exclusion and outer sampling radius for a gauge of radius `r`.
    pub fn radii(&self, r: f32) -> (f32, f32) {
        let inner = (self.inner_radius_frac * r).max(self.min_inner_radius_px);
        (inner, self.outer_radius_frac * r)
    }
}

/// One scored coarse angle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AngleCandidate {
    /// Math-convention angle in `[0, 360)`.
    pub angle_degrees: f64,
    /// Darkness/contiguity cost; lower is better.
    pub score: f32,
    /// Pixels sampled along the ray.
    pub sample_count: usize,
}

/// Needle scan outcome.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NeedleDetection {
    /// Refined math-convention angle in `[0, 360)`.
    pub angle_degrees: f64,
    /// Plateau center of the coarse scan, before refinement.
    pub coarse_angle_degrees: f64,
    /// Score at the refined angle.
    pub best_score: f32,
    /// Best coarse score far enough from the winner to be a different ray.
    pub runner_up_score: Option<f32>,
    /// Quality in `[0, 1]`: margin over the runner-up times absolute darkness.
    pub confidence: f32,
    /// Best score too bright or confidence below threshold.
    pub low_confidence: bool,
    /// Top-K coarse candidates, best first.
    pub candidates: Vec<AngleCandidate>,
    pub inner_radius: f32,
    pub outer_radius: f32,
}

struct ScanContext<'a> {
    gray: &'a GrayImage,
    geom: RayGeometry,
    config: &'a NeedleDetectorConfig,
    min_samples: usize,
}

impl ScanContext<'_> {
    /// Score of the ray at `angle_deg`, or `None` if too few samples landed.
    fn score(&self, angle_deg: f64) -> Option<(f32, usize)> {
        let p = ray::sample_ray(self.gray, &self.geom, angle_deg, self.config.gap_intensity);
        if p.sample_count == 0 || p.sample_count < self.min_samples {
            return None;
        }
        Some((
            p.mean + self.config.gap_penalty * p.gap_fraction,
            p.sample_count,
        ))
    }
}

/// Find the needle angle around `circle`.
///
/// Fails with [`GaugeError::NoNeedleDetected`] only when no ray of the coarse
/// scan has enough in-image samples. A dim or ambiguous needle still yields a
/// detection, flagged through `low_confidence`.
pub fn detect_needle(
    gray: &GrayImage,
    circle: &Circle,
    config: &NeedleDetectorConfig,
) -> GaugeResult<NeedleDetection> {
    config.validate()?;
    let radius = circle.radius as f32;
    let (inner_radius, outer_radius) = config.radii(radius);
    let no_needle = |candidates: Vec<AngleCandidate>| GaugeError::NoNeedleDetected {
        circle: *circle,
        candidates,
    };
    if !(radius > 0.0) || outer_radius <= inner_radius {
        tracing::debug!(
            "needle scan skipped: sampling band {:.1}..{:.1} is empty",
            inner_radius,
            outer_radius
        );
        return Err(no_needle(Vec::new()));
    }

    let geom = RayGeometry {
        center: [circle.center_x as f32, circle.center_y as f32],
        inner_radius,
        outer_radius,
        step: config.sample_step_px,
    };
    let expected = geom.expected_samples();
    let ctx = ScanContext {
        gray,
        geom,
        config,
        min_samples: (config.min_valid_fraction * expected as f32).ceil() as usize,
    };

    // Coarse scan over the full circle.
    let n_coarse = ((360.0 / config.coarse_step_deg).round() as usize).max(1);
    let coarse_step = 360.0 / n_coarse as f64;
    let coarse: Vec<Option<(f32, usize)>> = (0..n_coarse)
        .map(|i| ctx.score(i as f64 * coarse_step))
        .collect();

    let mut ranked: Vec<AngleCandidate> = coarse
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            s.map(|(score, sample_count)| AngleCandidate {
                angle_degrees: i as f64 * coarse_step,
                score,
                sample_count,
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(a.angle_degrees.total_cmp(&b.angle_degrees))
    });
    let Some(best) = ranked.first().copied() else {
        tracing::debug!("needle scan: no ray has enough in-image samples");
        return Err(no_needle(Vec::new()));
    };
    let n_valid = ranked.len();
    let median_score = ranked[n_valid / 2].score;
    let tolerance = config
        .plateau_tolerance
        .max(config.plateau_contrast_frac * (median_score - best.score));
    ranked.truncate(config.top_k);

    let coarse_scores: Vec<Option<f32>> = coarse.iter().map(|s| s.map(|(v, _)| v)).collect();
    let best_idx = (best.angle_degrees / coarse_step).round() as usize % n_coarse;
    let coarse_center = plateau_center(&coarse_scores, best_idx, tolerance, true);
    let coarse_angle = normalize_degrees(coarse_center * coarse_step);

    let (angle_degrees, best_score) = refine(&ctx, coarse_angle, best.score, tolerance);

    let runner_up_score = coarse
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|(v, _)| (i as f64 * coarse_step, v)))
        .filter(|&(a, _)| angular_distance(a, angle_degrees) > config.runner_up_separation_deg)
        .map(|(_, v)| v)
        .min_by(f32::total_cmp);

    let confidence = confidence(best_score, runner_up_score, config.too_bright_score);
    let low_confidence = best_score > config.too_bright_score || confidence < config.min_confidence;

    tracing::debug!(
        "needle scan: {} valid rays, plateau margin {:.1}, coarse {:.1}°, refined {:.2}° score={:.1} runner-up={:?} confidence={:.2}",
        n_valid,
        tolerance,
        coarse_angle,
        angle_degrees,
        best_score,
        runner_up_score,
        confidence
    );

    Ok(NeedleDetection {
        angle_degrees,
        coarse_angle_degrees: coarse_angle,
        best_score,
        runner_up_score,
        confidence,
        low_confidence,
        candidates: ranked,
        inner_radius,
        outer_radius,
    })
}

/// Fine scan around `coarse_angle`; falls back to the coarse result when no
/// fine ray is valid.
fn refine(
    ctx: &ScanContext<'_>,
    coarse_angle: f64,
    coarse_score: f32,
    tolerance: f32,
) -> (f64, f32) {
    let step = ctx.config.refine_step_deg;
    let half = (ctx.config.refine_window_deg / step).round() as i64;
    if half == 0 {
        return (coarse_angle, ctx.score(coarse_angle).map_or(coarse_score, |s| s.0));
    }
    let fine: Vec<Option<f32>> = (-half..=half)
        .map(|j| ctx.score(coarse_angle + j as f64 * step).map(|s| s.0))
        .collect();
    let Some((best_idx, best_score)) = fine
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|v| (i, v)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return (coarse_angle, coarse_score);
    };
    let center = plateau_center(&fine, best_idx, tolerance, false);
    let angle = normalize_degrees(coarse_angle + (center - half as f64) * step);
    (angle, best_score)
}

/// Fractional index of the middle of the plateau containing `best`.
///
/// The plateau is the contiguous run of valid scores within `tolerance` of
/// `scores[best]`. With `circular`, the run may wrap around the ends and the
/// result may fall outside `[0, len)`.
fn plateau_center(scores: &[Option<f32>], best: usize, tolerance: f32, circular: bool) -> f64 {
    let n = scores.len();
    let Some(best_score) = scores.get(best).copied().flatten() else {
        return best as f64;
    };
    let limit = best_score + tolerance.max(0.0);
    let within = |i: usize| scores[i].is_some_and(|s| s <= limit);

    let mut left = 0usize;
    while left + 1 < n {
        let idx = if circular {
            (best + n - (left + 1) % n) % n
        } else if best > left {
            best - left - 1
        } else {
            break;
        };
        if !within(idx) {
            break;
        }
        left += 1;
    }
    let mut right = 0usize;
    while left + right + 1 < n {
        let idx = if circular {
            (best + right + 1) % n
        } else if best + right + 1 < n {
            best + right + 1
        } else {
            break;
        };
        if !within(idx) {
            break;
        }
        right += 1;
    }
    best as f64 + (right as f64 - left as f64) / 2.0
}

/// Margin over the runner-up scaled by how far below "too bright" the best is.
fn confidence(best: f32, runner_up: Option<f32>, too_bright: f32) -> f32 {
    let separation = match runner_up {
        Some(r) if r > best => (r - best) / r.max(1.0),
        _ => 0.0,
    };
    let darkness = if too_bright > 0.0 {
        ((too_bright - best) / too_bright).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (separation * darkness).clamp(0.0, 1.0)
}
