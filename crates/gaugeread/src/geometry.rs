//! Angle conventions and wraparound-aware interpolation.
//!
//! Two conventions meet in this crate:
//! - **math**: 0° on +x (3 o'clock), counter-clockwise positive, Y up.
//! - **clock**: 0° at 12 o'clock, clockwise positive.
//!
//! Detection works in the math convention; calibrations are written in clock
//! hours. Everything here is a pure function.

use crate::error::{GaugeError, GaugeResult};

/// Degrees covered by one hour on a 12-hour dial.
pub const DEGREES_PER_HOUR: f64 = 30.0;

/// Wrap an angle into `[0, 360)`.
#[inline]
pub fn normalize_degrees(deg: f64) -> f64 {
    let r = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if r >= 360.0 {
        0.0
    } else {
        r
    }
}

/// Convert a math-convention angle to clock convention: `(90 - a) mod 360`.
#[inline]
pub fn to_clock_convention(math_deg: f64) -> f64 {
    normalize_degrees(90.0 - math_deg)
}

/// Convert a clock-convention angle back to math convention.
///
/// The formula is the same reflection as [`to_clock_convention`]; it is kept
/// as a separate name so call sites state which direction they mean.
#[inline]
pub fn to_math_convention(clock_deg: f64) -> f64 {
    normalize_degrees(90.0 - clock_deg)
}

/// Clock hours to clock degrees.
#[inline]
pub fn hours_to_degrees(hours: f64) -> f64 {
    hours * DEGREES_PER_HOUR
}

/// Clock degrees to clock hours.
#[inline]
pub fn degrees_to_hours(deg: f64) -> f64 {
    deg / DEGREES_PER_HOUR
}

/// Clockwise sweep from `from_deg` to `to_deg`, in `[0, 360)`.
#[inline]
pub fn clockwise_span(from_deg: f64, to_deg: f64) -> f64 {
    normalize_degrees(to_deg - from_deg)
}

/// Smallest absolute difference between two angles, in `[0, 180]`.
#[inline]
pub fn angular_distance(a_deg: f64, b_deg: f64) -> f64 {
    let d = normalize_degrees(a_deg - b_deg);
    d.min(360.0 - d)
}

/// Linear interpolation along the clockwise sweep from `min_angle_deg` to
/// `max_angle_deg` (all angles in clock convention).
///
/// Both the span and the needle offset are taken modulo 360, which handles a
/// dead sector that crosses 0°. The result is not clamped: a needle inside
/// the dead sector maps past `max_value`.
pub fn interpolate_angle_to_value(
    needle_angle_deg: f64,
    min_angle_deg: f64,
    max_angle_deg: f64,
    min_value: f64,
    max_value: f64,
) -> GaugeResult<f64> {
    if !(needle_angle_deg.is_finite() && min_angle_deg.is_finite() && max_angle_deg.is_finite())
    {
        return Err(GaugeError::invalid_calibration("non-finite angle"));
    }
    let span = clockwise_span(min_angle_deg, max_angle_deg);
    if span <= f64::EPSILON {
        return Err(GaugeError::invalid_calibration(format!(
            "angular span collapses to zero ({:.3}° to {:.3}°)",
            min_angle_deg, max_angle_deg
        )));
    }
    let offset = clockwise_span(min_angle_deg, needle_angle_deg);
    Ok(min_value + offset / span * (max_value - min_value))
}

/// Parse a clock position into clock-convention degrees.
///
/// Accepted forms: `"7am"`, `"7pm"`, `"7:30"`, `"7"`, `"7.5"`, `"210deg"`,
/// `"210°"`. Hour forms are taken modulo 12, so `"12"` is 0°.
pub fn parse_clock_degrees(input: &str) -> GaugeResult<f64> {
    let err = |reason: &str| GaugeError::InvalidClockPosition {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(err("empty"));
    }

    if let Some(deg) = s
        .strip_suffix("deg")
        .or_else(|| s.strip_suffix('°'))
        .map(str::trim)
    {
        let v: f64 = deg.parse().map_err(|_| err("bad degree value"))?;
        if !v.is_finite() {
            return Err(err("non-finite degree value"));
        }
        return Ok(normalize_degrees(v));
    }

    let hour_str = s
        .strip_suffix("am")
        .or_else(|| s.strip_suffix("pm"))
        .unwrap_or(&s)
        .trim();
    let hours = if let Some((h, m)) = hour_str.split_once(':') {
        let h: f64 = h.trim().parse().map_err(|_| err("bad hour"))?;
        let m: f64 = m.trim().parse().map_err(|_| err("bad minutes"))?;
        if !(0.0..60.0).contains(&m) {
            return Err(err("minutes out of range"));
        }
        h + m / 60.0
    } else {
        hour_str.parse().map_err(|_| err("bad hour"))?
    };
    if !hours.is_finite() || hours < 0.0 {
        return Err(err("hour out of range"));
    }
    Ok(hours_to_degrees(hours.rem_euclid(12.0)))
}
