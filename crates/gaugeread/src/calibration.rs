//! Gauge calibration: where the sweep starts and ends on the dial and which
//! values those ends represent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GaugeError, GaugeResult};
use crate::geometry::{clockwise_span, hours_to_degrees};

/// Validated calibration for one gauge.
///
/// `min_value` sits at `min_angle_hours`, `max_value` at `max_angle_hours`,
/// and values grow along the clockwise sweep between them. A calibration
/// value can only be obtained through [`GaugeCalibration::new`] or a
/// deserialization that runs the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationFields")]
pub struct GaugeCalibration {
    min_angle_hours: f64,
    max_angle_hours: f64,
    min_value: f64,
    max_value: f64,
    units: String,
}

#[derive(Deserialize)]
struct CalibrationFields {
    min_angle_hours: f64,
    max_angle_hours: f64,
    min_value: f64,
    max_value: f64,
    #[serde(default)]
    units: String,
}

impl TryFrom<CalibrationFields> for GaugeCalibration {
    type Error = GaugeError;

    fn try_from(f: CalibrationFields) -> Result<Self, Self::Error> {
        Self::new(
            f.min_angle_hours,
            f.max_angle_hours,
            f.min_value,
            f.max_value,
            f.units,
        )
    }
}

impl GaugeCalibration {
    /// Build and validate a calibration.
    ///
    /// Angle hours must lie in `[0, 12)`, values must be finite, and the
    /// clockwise sweep from min to max must be non-empty.
    pub fn new(
        min_angle_hours: f64,
        max_angle_hours: f64,
        min_value: f64,
        max_value: f64,
        units: impl Into<String>,
    ) -> GaugeResult<Self> {
        for (name, h) in [
            ("min_angle_hours", min_angle_hours),
            ("max_angle_hours", max_angle_hours),
        ] {
            if !h.is_finite() || !(0.0..12.0).contains(&h) {
                return Err(GaugeError::invalid_calibration(format!(
                    "{name} must be in [0, 12), got {h}"
                )));
            }
        }
        if !min_value.is_finite() || !max_value.is_finite() {
            return Err(GaugeError::invalid_calibration(
                "min_value and max_value must be finite",
            ));
        }
        let cal = Self {
            min_angle_hours,
            max_angle_hours,
            min_value,
            max_value,
            units: units.into(),
        };
        if cal.sweep_degrees() <= f64::EPSILON {
            return Err(GaugeError::invalid_calibration(format!(
                "angular sweep from {min_angle_hours}h to {max_angle_hours}h is empty"
            )));
        }
        Ok(cal)
    }

    /// Load a calibration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn min_angle_hours(&self) -> f64 {
        self.min_angle_hours
    }

    pub fn max_angle_hours(&self) -> f64 {
        self.max_angle_hours
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    /// Start of the sweep in clock degrees.
    pub fn min_angle_degrees(&self) -> f64 {
        hours_to_degrees(self.min_angle_hours)
    }

    /// End of the sweep in clock degrees.
    pub fn max_angle_degrees(&self) -> f64 {
        hours_to_degrees(self.max_angle_hours)
    }

    /// Clockwise sweep in degrees, in `(0, 360)`.
    pub fn sweep_degrees(&self) -> f64 {
        clockwise_span(self.min_angle_degrees(), self.max_angle_degrees())
    }

    /// Whether the sweep passes through 12 o'clock.
    pub fn wraps(&self) -> bool {
        self.max_angle_hours < self.min_angle_hours
    }

    /// Lower and upper value bounds regardless of sweep direction.
    pub fn value_bounds(&self) -> (f64, f64) {
        (
            self.min_value.min(self.max_value),
            self.min_value.max(self.max_value),
        )
    }
}

impl Default for GaugeCalibration {
    /// Seven o'clock to five o'clock, 0 to 100.
    fn default() -> Self {
        Self {
            min_angle_hours: 7.0,
            max_angle_hours: 5.0,
            min_value: 0.0,
            max_value: 100.0,
            units: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_calibration_sweeps_three_hundred_degrees() {
        let cal = GaugeCalibration::default();
        assert_abs_diff_eq!(cal.min_angle_degrees(), 210.0);
        assert_abs_diff_eq!(cal.max_angle_degrees(), 150.0);
        assert_abs_diff_eq!(cal.sweep_degrees(), 300.0);
        assert!(cal.wraps());
    }

    #[test]
    fn rejects_hours_out_of_range() {
        assert!(GaugeCalibration::new(12.0, 5.0, 0.0, 1.0, "").is_err());
        assert!(GaugeCalibration::new(-0.5, 5.0, 0.0, 1.0, "").is_err());
        assert!(GaugeCalibration::new(7.0, f64::NAN, 0.0, 1.0, "").is_err());
    }

    #[test]
    fn rejects_empty_sweep() {
        let err = GaugeCalibration::new(3.0, 3.0, 0.0, 1.0, "bar").unwrap_err();
        assert!(matches!(err, GaugeError::InvalidCalibration(_)));
    }

    #[test]
    fn accepts_equal_values() {
        // Only the angular sweep has to be non-empty.
        assert!(GaugeCalibration::new(8.0, 4.0, 5.0, 5.0, "").is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let ok: GaugeCalibration = serde_json::from_str(
            r#"{"min_angle_hours": 8, "max_angle_hours": 4, "min_value": -20, "max_value": 50, "units": "°C"}"#,
        )
        .unwrap();
        assert_eq!(ok.units(), "°C");
        assert_abs_diff_eq!(ok.sweep_degrees(), 240.0);

        let bad = serde_json::from_str::<GaugeCalibration>(
            r#"{"min_angle_hours": 4, "max_angle_hours": 4, "min_value": 0, "max_value": 1}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn serializes_round_trip_through_json() {
        let cal = GaugeCalibration::new(9.0, 3.0, 0.0, 1.0, "fuel").unwrap();
        let json = serde_json::to_string(&cal).unwrap();
        let back: GaugeCalibration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cal);
    }
}
