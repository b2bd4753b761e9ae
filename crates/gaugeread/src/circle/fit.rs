//! Algebraic least-squares circle fit (Kåsa).
//!
//! Solves `x² + y² + D x + E y + F = 0` in the least-squares sense through the
//! 3x3 normal equations. Points are shifted to a local origin first so the
//! system stays well conditioned for large pixel coordinates.

use nalgebra::{Matrix3, Vector3};

/// Fitted circle in the caller's coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CircleFit {
    pub cx: f64,
    pub cy: f64,
    pub r: f64,
    /// RMS radial residual in pixels.
    pub rms: f64,
}

/// Fit a circle to `points`, using `origin` as the local frame.
///
/// Returns `None` for fewer than three points or a degenerate (collinear)
/// configuration.
pub(crate) fn fit_circle(points: &[[f64; 2]], origin: [f64; 2]) -> Option<CircleFit> {
    if points.len() < 3 {
        return None;
    }
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let u = p[0] - origin[0];
        let v = p[1] - origin[1];
        let row = Vector3::new(u, v, 1.0);
        let rhs = -(u * u + v * v);
        ata += row * row.transpose();
        atb += row * rhs;
    }
    let sol = ata.lu().solve(&atb)?;
    let (d, e, f) = (sol[0], sol[1], sol[2]);
    let cu = -0.5 * d;
    let cv = -0.5 * e;
    let r_sq = cu * cu + cv * cv - f;
    if !r_sq.is_finite() || r_sq <= 0.0 {
        return None;
    }
    let r = r_sq.sqrt();

    let mut sum_sq = 0.0;
    for p in points {
        let du = p[0] - origin[0] - cu;
        let dv = p[1] - origin[1] - cv;
        let res = (du * du + dv * dv).sqrt() - r;
        sum_sq += res * res;
    }
    Some(CircleFit {
        cx: cu + origin[0],
        cy: cv + origin[1],
        r,
        rms: (sum_sq / points.len() as f64).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn circle_points(cx: f64, cy: f64, r: f64, n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64 * std::f64::consts::TAU;
                [cx + r * t.cos(), cy + r * t.sin()]
            })
            .collect()
    }

    #[test]
    fn recovers_exact_circle() {
        let pts = circle_points(312.5, 198.25, 87.0, 64);
        let fit = fit_circle(&pts, [300.0, 200.0]).unwrap();
        assert_abs_diff_eq!(fit.cx, 312.5, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.cy, 198.25, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.r, 87.0, epsilon = 1e-6);
        assert!(fit.rms < 1e-6);
    }

    #[test]
    fn recovers_circle_from_partial_arc() {
        let pts: Vec<_> = circle_points(50.0, 60.0, 20.0, 90)
            .into_iter()
            .take(40)
            .collect();
        let fit = fit_circle(&pts, [0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(fit.r, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(fit_circle(&[[0.0, 0.0], [1.0, 1.0]], [0.0, 0.0]).is_none());
        let collinear: Vec<_> = (0..10).map(|i| [i as f64, 2.0 * i as f64]).collect();
        assert!(fit_circle(&collinear, [0.0, 0.0]).is_none());
    }
}
