//! Angle-to-value mapping on top of a calibration.

use crate::calibration::GaugeCalibration;
use crate::error::GaugeResult;
use crate::geometry::{
    angular_distance, clockwise_span, interpolate_angle_to_value, to_clock_convention,
};

/// What to do with a needle that sits in the dead sector of the dial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Report the raw interpolated value and flag it.
    #[default]
    Report,
    /// Snap to the nearer end of the sweep and flag it.
    Clamp,
}

/// Result of mapping one needle angle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappedValue {
    /// Value after the out-of-range policy.
    pub value: f64,
    /// Interpolated value before any clamping.
    pub raw_value: f64,
    pub needle_angle_math_degrees: f64,
    pub needle_angle_clock_degrees: f64,
    /// Needle lies outside the calibrated sweep.
    pub out_of_range: bool,
}

/// Map a math-convention needle angle through `calibration`.
pub fn map_angle(
    needle_math_deg: f64,
    calibration: &GaugeCalibration,
    policy: OutOfRangePolicy,
) -> GaugeResult<MappedValue> {
    let clock = to_clock_convention(needle_math_deg);
    let min_deg = calibration.min_angle_degrees();
    let max_deg = calibration.max_angle_degrees();
    let raw_value = interpolate_angle_to_value(
        clock,
        min_deg,
        max_deg,
        calibration.min_value(),
        calibration.max_value(),
    )?;

    let out_of_range = clockwise_span(min_deg, clock) > calibration.sweep_degrees() + 1e-9;
    let value = match policy {
        OutOfRangePolicy::Clamp if out_of_range => {
            if angular_distance(clock, min_deg) <= angular_distance(clock, max_deg) {
                calibration.min_value()
            } else {
                calibration.max_value()
            }
        }
        _ => raw_value,
    };
    Ok(MappedValue {
        value,
        raw_value,
        needle_angle_math_degrees: needle_math_deg,
        needle_angle_clock_degrees: clock,
        out_of_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn maps_reference_needle_positions() {
        let cal = GaugeCalibration::default();
        let m = map_angle(142.5, &cal, OutOfRangePolicy::Report).unwrap();
        assert_abs_diff_eq!(m.needle_angle_clock_degrees, 307.5, epsilon = 1e-9);
        assert_abs_diff_eq!(m.value, 32.5, epsilon = 1e-9);
        assert!(!m.out_of_range);

        let m = map_angle(307.5, &cal, OutOfRangePolicy::Report).unwrap();
        assert_abs_diff_eq!(m.needle_angle_clock_degrees, 142.5, epsilon = 1e-9);
        assert_abs_diff_eq!(m.value, 97.5, epsilon = 1e-9);
    }

    #[test]
    fn straight_up_is_mid_scale() {
        let m = map_angle(90.0, &GaugeCalibration::default(), OutOfRangePolicy::Report).unwrap();
        assert_abs_diff_eq!(m.needle_angle_clock_degrees, 0.0);
        assert_abs_diff_eq!(m.value, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn dead_sector_is_reported_raw() {
        // Six o'clock, inside the 5h..7h dead sector.
        let m = map_angle(270.0, &GaugeCalibration::default(), OutOfRangePolicy::Report).unwrap();
        assert!(m.out_of_range);
        assert_abs_diff_eq!(m.raw_value, 330.0 / 300.0 * 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.value, m.raw_value);
    }

    #[test]
    fn clamp_snaps_to_nearer_end() {
        let cal = GaugeCalibration::default();
        // Clock 160°: just past the 150° end.
        let near_max = map_angle(290.0, &cal, OutOfRangePolicy::Clamp).unwrap();
        assert!(near_max.out_of_range);
        assert_abs_diff_eq!(near_max.value, 100.0);
        assert!(near_max.raw_value > 100.0);
        // Clock 200°: just before the 210° start.
        let near_min = map_angle(250.0, &cal, OutOfRangePolicy::Clamp).unwrap();
        assert_abs_diff_eq!(near_min.value, 0.0);
    }

    #[test]
    fn descending_scale_interpolates_backwards() {
        let cal = GaugeCalibration::new(8.0, 4.0, 50.0, -20.0, "°C").unwrap();
        // 12 o'clock is halfway through the 240° sweep.
        let m = map_angle(90.0, &cal, OutOfRangePolicy::Report).unwrap();
        assert_abs_diff_eq!(m.value, 15.0, epsilon = 1e-9);
        assert!(!m.out_of_range);
    }
}
