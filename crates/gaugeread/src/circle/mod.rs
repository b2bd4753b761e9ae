//! Gauge-face localization.
//!
//! Pipeline: smooth → Scharr edges → center voting over the allowed radius
//! range → per-center radius histogram of radially aligned edges → arc
//! coverage gate → optional least-squares refit of the supporting edges.

mod fit;
mod hough;

use image::GrayImage;

use crate::error::{GaugeError, GaugeResult};
use crate::preprocess;

pub use hough::CenterPeak;

use hough::{EdgePixel, VoteParams};

/// Detected gauge face in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Circle {
    /// Center column.
    pub center_x: f64,
    /// Center row.
    pub center_y: f64,
    /// Radius, always `> 0`.
    pub radius: f64,
    /// Fraction of angular sectors with supporting edge pixels, in `[0, 1]`.
    pub coverage: f32,
    /// Number of radially aligned edge pixels supporting the radius.
    pub votes: u32,
}

impl Circle {
    /// Whether `center ± radius` stays within `[0, width] x [0, height]`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.radius > 0.0
            && self.center_x - self.radius >= 0.0
            && self.center_y - self.radius >= 0.0
            && self.center_x + self.radius <= width as f64
            && self.center_y + self.radius <= height as f64
    }

    pub fn center(&self) -> [f64; 2] {
        [self.center_x, self.center_y]
    }
}

/// Configuration for gauge-face circle location.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircleLocatorConfig {
    /// Gaussian sigma of the noise-suppression pass (`<= 0` disables it).
    pub blur_sigma: f32,
    /// Minimum radius as a fraction of the smaller image dimension. With the
    /// default of 0.20, faces smaller than 20% of the smaller dimension are
    /// rejected; set `min_radius_px` for small dials in large frames.
    pub min_radius_frac: f32,
    /// Maximum radius as a fraction of the smaller image dimension.
    pub max_radius_frac: f32,
    /// Explicit minimum radius in pixels; overrides `min_radius_frac`.
    pub min_radius_px: Option<f32>,
    /// Explicit maximum radius in pixels; overrides `max_radius_frac`.
    pub max_radius_px: Option<f32>,
    /// Gradient magnitude threshold (fraction of the strongest gradient).
    pub grad_threshold: f32,
    /// Absolute Scharr magnitude below which the image counts as featureless.
    pub min_gradient: f32,
    /// Gaussian sigma for accumulator smoothing.
    pub accum_sigma: f32,
    /// NMS radius for center-peak extraction (pixels).
    pub nms_radius: f32,
    /// How many center peaks get a radius search.
    pub max_center_candidates: usize,
    /// Minimum |cos| between an edge gradient and the center direction.
    pub radial_alignment: f32,
    /// Half-width (pixels) of the radius window that collects votes.
    pub radius_window_px: f32,
    /// Number of angular sectors used for the coverage gate.
    pub coverage_sectors: usize,
    /// Minimum fraction of sectors that must contain supporting edges.
    pub min_arc_coverage: f32,
    /// Refit center and radius from the supporting edge pixels.
    pub refine: bool,
    /// Band (pixels) around the voted radius used to pick refit points.
    pub refine_band_px: f32,
}

impl Default for CircleLocatorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            min_radius_frac: 0.20,
            max_radius_frac: 0.48,
            min_radius_px: None,
            max_radius_px: None,
            grad_threshold: 0.2,
            min_gradient: 64.0,
            accum_sigma: 2.0,
            nms_radius: 5.0,
            max_center_candidates: 5,
            radial_alignment: 0.85,
            radius_window_px: 3.0,
            coverage_sectors: 72,
            min_arc_coverage: 0.5,
            refine: true,
            refine_band_px: 5.0,
        }
    }
}

impl CircleLocatorConfig {
    /// Allowed `[r_min, r_max]` for an image of the given size.
    pub fn radius_range(&self, width: u32, height: u32) -> [f32; 2] {
        let min_dim = width.min(height) as f32;
        let r_min = self
            .min_radius_px
            .unwrap_or(self.min_radius_frac * min_dim)
            .max(3.0);
        let r_max = self.max_radius_px.unwrap_or(self.max_radius_frac * min_dim);
        [r_min, r_max]
    }

    fn validate(&self) -> GaugeResult<()> {
        if !(0.0..=1.0).contains(&self.grad_threshold) {
            return Err(GaugeError::invalid_config(
                "circle.grad_threshold must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_arc_coverage) {
            return Err(GaugeError::invalid_config(
                "circle.min_arc_coverage must be in [0, 1]",
            ));
        }
        if let (Some(lo), Some(hi)) = (self.min_radius_px, self.max_radius_px) {
            if !(lo.is_finite() && hi.is_finite()) || hi < lo {
                return Err(GaugeError::invalid_config(format!(
                    "circle radius bounds are inverted ({lo:.1}..{hi:.1} px)"
                )));
            }
        }
        if !(self.min_radius_frac.is_finite() && self.max_radius_frac.is_finite())
            || self.max_radius_frac < self.min_radius_frac
        {
            return Err(GaugeError::invalid_config(
                "circle.max_radius_frac must not be below circle.min_radius_frac",
            ));
        }
        if self.coverage_sectors == 0 || self.max_center_candidates == 0 {
            return Err(GaugeError::invalid_config(
                "circle.coverage_sectors and circle.max_center_candidates must be positive",
            ));
        }
        Ok(())
    }
}

/// One evaluated (center, radius) hypothesis.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CircleCandidate {
    /// The center peak this hypothesis started from.
    pub peak: CenterPeak,
    /// Best circle for that center (before refinement).
    pub circle: Circle,
    /// Whether the coverage gate accepted it.
    pub accepted: bool,
}

/// Everything the locator looked at, for diagnostics.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CircleSearch {
    pub image_size: [u32; 2],
    pub radius_range: [f32; 2],
    pub n_edge_pixels: usize,
    /// Candidates in evaluation order (strongest center peak first).
    pub candidates: Vec<CircleCandidate>,
    /// Final circle, refined when refinement succeeded.
    pub best: Option<Circle>,
    /// Whether `best` came from the least-squares refit.
    pub refined: bool,
}

/// Locate the single most plausible gauge face.
///
/// Fails with [`GaugeError::NoCircleDetected`] when nothing clears the
/// coverage threshold; never returns a degenerate circle.
pub fn locate_circle(gray: &GrayImage, config: &CircleLocatorConfig) -> GaugeResult<Circle> {
    search_circles(gray, config)?.best_circle(config)
}

/// Run the full locator and keep every intermediate hypothesis.
///
/// Only configuration problems are errors here; an empty `best` means no
/// circle was found.
pub fn search_circles(gray: &GrayImage, config: &CircleLocatorConfig) -> GaugeResult<CircleSearch> {
    config.validate()?;
    let (w, h) = gray.dimensions();
    let [r_min, r_max] = config.radius_range(w, h);
    if !(r_min.is_finite() && r_max.is_finite()) || r_max < r_min {
        tracing::debug!(
            "circle search skipped: {}x{} image leaves radius range {:.1}..{:.1} empty",
            w,
            h,
            r_min,
            r_max
        );
        return Ok(CircleSearch {
            image_size: [w, h],
            radius_range: [r_min, r_max],
            n_edge_pixels: 0,
            candidates: Vec::new(),
            best: None,
            refined: false,
        });
    }

    let smoothed = preprocess::smooth(gray, config.blur_sigma);
    let edges = hough::edge_pixels(&smoothed, config.grad_threshold, config.min_gradient);
    let mut search = CircleSearch {
        image_size: [w, h],
        radius_range: [r_min, r_max],
        n_edge_pixels: edges.len(),
        candidates: Vec::new(),
        best: None,
        refined: false,
    };
    tracing::debug!(
        "circle search: {}x{} image, radius {:.1}..{:.1}, {} edge pixels",
        w,
        h,
        r_min,
        r_max,
        edges.len()
    );
    if edges.is_empty() {
        return Ok(search);
    }

    let peaks = hough::vote_centers(
        w,
        h,
        &edges,
        &VoteParams {
            r_min,
            r_max,
            accum_sigma: config.accum_sigma,
            nms_radius: config.nms_radius,
            max_peaks: config.max_center_candidates,
        },
    );

    let mut best: Option<Circle> = None;
    for peak in peaks {
        let Some(circle) = best_radius_for_center(&edges, peak, w, h, r_min, r_max, config) else {
            continue;
        };
        let accepted = circle.coverage >= config.min_arc_coverage;
        tracing::debug!(
            "circle candidate ({:.1}, {:.1}) r={:.1} votes={} coverage={:.2} accepted={}",
            circle.center_x,
            circle.center_y,
            circle.radius,
            circle.votes,
            circle.coverage,
            accepted
        );
        if accepted && best.map_or(true, |b| circle.votes > b.votes) {
            best = Some(circle);
        }
        search.candidates.push(CircleCandidate {
            peak,
            circle,
            accepted,
        });
    }

    if let Some(circle) = best {
        let refit = if config.refine {
            refine_circle(&edges, &circle, w, h, config)
        } else {
            None
        };
        search.refined = refit.is_some();
        search.best = Some(refit.unwrap_or(circle));
    }
    Ok(search)
}

impl CircleSearch {
    /// The accepted circle, or a [`GaugeError::NoCircleDetected`] explaining
    /// where the search gave up.
    pub fn best_circle(&self, config: &CircleLocatorConfig) -> GaugeResult<Circle> {
        if let Some(circle) = self.best {
            return Ok(circle);
        }
        let [width, height] = self.image_size;
        let [r_min, r_max] = self.radius_range;
        let reason = if !(r_max >= r_min) {
            format!("image too small for the radius range ({r_min:.1}..{r_max:.1} px)")
        } else if self.n_edge_pixels == 0 {
            "no edge pixels above the gradient threshold".to_string()
        } else if self.candidates.is_empty() {
            "no center hypothesis admits a radius inside the image".to_string()
        } else {
            let best_cov = self
                .candidates
                .iter()
                .map(|c| c.circle.coverage)
                .fold(0.0f32, f32::max);
            format!(
                "best arc coverage {:.2} below threshold {:.2}",
                best_cov, config.min_arc_coverage
            )
        };
        Err(GaugeError::NoCircleDetected {
            width,
            height,
            reason,
        })
    }
}

/// Radius histogram of radially aligned edges around one center.
fn best_radius_for_center(
    edges: &[EdgePixel],
    peak: CenterPeak,
    w: u32,
    h: u32,
    r_min: f32,
    r_max: f32,
    config: &CircleLocatorConfig,
) -> Option<Circle> {
    let (cx, cy) = (peak.x, peak.y);
    // The whole circle must stay inside the image.
    let r_cap = r_max
        .min(cx)
        .min(cy)
        .min(w as f32 - cx)
        .min(h as f32 - cy);
    if r_cap < r_min {
        return None;
    }
    let r_lo = r_min.ceil() as usize;
    let r_hi = r_cap.floor() as usize;
    if r_hi < r_lo {
        return None;
    }
    let win = config.radius_window_px.max(0.0).round() as usize;

    let mut hist = vec![0u32; r_hi + win + 2];
    for e in edges {
        let Some((d, cos)) = e.radial_alignment(cx, cy) else {
            continue;
        };
        if cos < config.radial_alignment {
            continue;
        }
        let bin = d.round() as usize;
        if bin < hist.len() {
            hist[bin] += 1;
        }
    }

    let mut best_r = r_lo;
    let mut best_votes = 0u32;
    for r in r_lo..=r_hi {
        let lo = r.saturating_sub(win);
        let votes: u32 = hist[lo..=(r + win)].iter().sum();
        if votes > best_votes {
            best_votes = votes;
            best_r = r;
        }
    }
    if best_votes == 0 {
        return None;
    }

    let radius = best_r as f32;
    let coverage = arc_coverage(edges, cx, cy, radius, win as f32 + 0.5, config);
    Some(Circle {
        center_x: cx as f64,
        center_y: cy as f64,
        radius: radius as f64,
        coverage,
        votes: best_votes,
    })
}

fn arc_coverage(
    edges: &[EdgePixel],
    cx: f32,
    cy: f32,
    radius: f32,
    band: f32,
    config: &CircleLocatorConfig,
) -> f32 {
    let n = config.coverage_sectors;
    let mut hit = vec![false; n];
    for e in supporting_edges(edges, cx, cy, radius, band, config.radial_alignment) {
        let theta = (e.y - cy).atan2(e.x - cx);
        let frac = (theta + std::f32::consts::PI) / std::f32::consts::TAU;
        let sector = ((frac * n as f32) as usize).min(n - 1);
        hit[sector] = true;
    }
    hit.iter().filter(|&&b| b).count() as f32 / n as f32
}

fn supporting_edges<'a>(
    edges: &'a [EdgePixel],
    cx: f32,
    cy: f32,
    radius: f32,
    band: f32,
    min_alignment: f32,
) -> impl Iterator<Item = &'a EdgePixel> + 'a {
    edges.iter().filter(move |e| {
        e.radial_alignment(cx, cy)
            .is_some_and(|(d, cos)| (d - radius).abs() <= band && cos >= min_alignment)
    })
}

/// Least-squares refit; `None` keeps the voted circle.
fn refine_circle(
    edges: &[EdgePixel],
    circle: &Circle,
    w: u32,
    h: u32,
    config: &CircleLocatorConfig,
) -> Option<Circle> {
    let (cx, cy, r) = (
        circle.center_x as f32,
        circle.center_y as f32,
        circle.radius as f32,
    );
    let band = config.refine_band_px.max(1.0);
    let points: Vec<[f64; 2]> = supporting_edges(edges, cx, cy, r, band, config.radial_alignment)
        .map(|e| [e.x as f64, e.y as f64])
        .collect();
    if points.len() < 8 {
        return None;
    }
    let fit = fit::fit_circle(&points, circle.center())?;
    let shift = ((fit.cx - circle.center_x).powi(2) + (fit.cy - circle.center_y).powi(2)).sqrt();
    if shift > band as f64 || (fit.r - circle.radius).abs() > band as f64 {
        tracing::debug!(
            "circle refit rejected: shift {:.2}px, radius change {:.2}px",
            shift,
            fit.r - circle.radius
        );
        return None;
    }
    let refined = Circle {
        center_x: fit.cx,
        center_y: fit.cy,
        radius: fit.r,
        ..*circle
    };
    if !refined.fits_within(w, h) {
        return None;
    }
    tracing::debug!(
        "circle refit from {} points: ({:.2}, {:.2}) r={:.2} rms={:.2}",
        points.len(),
        fit.cx,
        fit.cy,
        fit.r,
        fit.rms
    );
    Some(refined)
}
