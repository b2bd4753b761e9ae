//! Reference test vectors: gauge photos with hand-read needle positions.
//!
//! A vector file is a JSON array of [`ReferenceVector`]s. Angles are clock
//! positions (`"7am"`, `"4:30"`, `"210deg"`).

use std::path::Path;

use crate::calibration::GaugeCalibration;
use crate::error::GaugeResult;
use crate::geometry::{
    angular_distance, clockwise_span, degrees_to_hours, interpolate_angle_to_value,
    parse_clock_degrees,
};
use crate::processor::AnalogGaugeProcessor;
use crate::source::{FileImageSource, ImageSource};

fn default_tolerance() -> f64 {
    0.2
}

/// One hand-labelled gauge image.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceVector {
    /// Image file, relative to the vector file's directory.
    pub file: String,
    /// Clock position of `min_value`.
    pub start_angle: String,
    /// Clock position of `max_value`.
    pub end_angle: String,
    pub min_value: f64,
    pub max_value: f64,
    /// Clock position of the needle as read by a person.
    pub detected_angle: String,
    pub expected_value: f64,
    /// Allowed absolute value error.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub description: String,
}

impl ReferenceVector {
    /// Load a JSON array of vectors.
    pub fn load_all(path: &Path) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn angles(&self) -> GaugeResult<(f64, f64, f64)> {
        Ok((
            parse_clock_degrees(&self.start_angle)?,
            parse_clock_degrees(&self.end_angle)?,
            parse_clock_degrees(&self.detected_angle)?,
        ))
    }

    /// Calibration described by this vector.
    pub fn calibration(&self) -> GaugeResult<GaugeCalibration> {
        let (start, end, _) = self.angles()?;
        GaugeCalibration::new(
            degrees_to_hours(start),
            degrees_to_hours(end),
            self.min_value,
            self.max_value,
            "",
        )
    }

    /// Value implied by the hand-read needle position.
    pub fn calculate_expected_value(&self) -> GaugeResult<f64> {
        let (start, end, needle) = self.angles()?;
        interpolate_angle_to_value(needle, start, end, self.min_value, self.max_value)
    }

    /// Labelling mistakes, empty when the vector is consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.file.trim().is_empty() {
            problems.push("file is empty".to_string());
        }
        if self.min_value >= self.max_value {
            problems.push(format!(
                "min_value {} must be less than max_value {}",
                self.min_value, self.max_value
            ));
        }
        if self.expected_value < self.min_value || self.expected_value > self.max_value {
            problems.push(format!(
                "expected_value {} outside [{}, {}]",
                self.expected_value, self.min_value, self.max_value
            ));
        }
        if !(self.tolerance >= 0.0) {
            problems.push(format!("tolerance {} must be non-negative", self.tolerance));
        }
        match self.angles() {
            Ok((start, end, needle)) => {
                let sweep = clockwise_span(start, end);
                if sweep <= f64::EPSILON {
                    problems.push("start_angle and end_angle coincide".to_string());
                } else if clockwise_span(start, needle) > sweep {
                    problems.push(format!(
                        "detected_angle {} lies outside the {}..{} sweep",
                        self.detected_angle, self.start_angle, self.end_angle
                    ));
                }
            }
            Err(e) => problems.push(e.to_string()),
        }
        if problems.is_empty() {
            if let Ok(v) = self.calculate_expected_value() {
                let err = (v - self.expected_value).abs();
                if err > self.tolerance {
                    problems.push(format!(
                        "expected_value {} disagrees with detected_angle (computes {:.3})",
                        self.expected_value, v
                    ));
                }
            }
        }
        problems
    }
}

/// Result of running the pipeline on one vector.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorOutcome {
    pub file: String,
    pub description: String,
    pub expected_value: f64,
    pub detected_value: Option<f64>,
    pub value_error: Option<f64>,
    /// Clock-degree difference between the detected and hand-read needle.
    pub angle_error_deg: Option<f64>,
    pub passed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VectorSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Vectors whose image could not be read or processed.
    pub errored: usize,
    pub mean_value_error: Option<f64>,
    pub max_value_error: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorReport {
    pub outcomes: Vec<VectorOutcome>,
    pub summary: VectorSummary,
}

/// Run `processor` over every vector whose image lives under `dir`.
pub fn evaluate_vectors(
    dir: &Path,
    vectors: &[ReferenceVector],
    processor: &AnalogGaugeProcessor,
) -> VectorReport {
    let outcomes: Vec<VectorOutcome> = vectors
        .iter()
        .map(|v| evaluate_one(dir, v, processor))
        .collect();

    let errors: Vec<f64> = outcomes.iter().filter_map(|o| o.value_error).collect();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let errored = outcomes.iter().filter(|o| o.error.is_some()).count();
    let summary = VectorSummary {
        total: outcomes.len(),
        passed,
        failed: outcomes.len() - passed - errored,
        errored,
        mean_value_error: (!errors.is_empty())
            .then(|| errors.iter().sum::<f64>() / errors.len() as f64),
        max_value_error: errors.iter().copied().reduce(f64::max),
    };
    tracing::info!(
        "reference vectors: {}/{} passed, {} failed, {} errored",
        summary.passed,
        summary.total,
        summary.failed,
        summary.errored
    );
    VectorReport { outcomes, summary }
}

fn evaluate_one(
    dir: &Path,
    vector: &ReferenceVector,
    processor: &AnalogGaugeProcessor,
) -> VectorOutcome {
    let mut outcome = VectorOutcome {
        file: vector.file.clone(),
        description: vector.description.clone(),
        expected_value: vector.expected_value,
        detected_value: None,
        value_error: None,
        angle_error_deg: None,
        passed: false,
        error: None,
    };
    let run = || -> Result<(f64, f64), Box<dyn std::error::Error>> {
        let calibration = vector.calibration()?;
        let image = FileImageSource::new(dir.join(&vector.file)).acquire()?;
        let reading = processor.process(&image, &calibration, None)?;
        Ok((reading.value, reading.needle_angle_clock_degrees))
    };
    match run() {
        Ok((value, clock)) => {
            let value_error = (value - vector.expected_value).abs();
            outcome.detected_value = Some(value);
            outcome.value_error = Some(value_error);
            outcome.angle_error_deg = parse_clock_degrees(&vector.detected_angle)
                .ok()
                .map(|hand| angular_distance(clock, hand));
            outcome.passed = value_error <= vector.tolerance;
            if !outcome.passed {
                tracing::warn!(
                    "{}: detected {:.3}, expected {} (error {:.3} > {})",
                    vector.file,
                    value,
                    vector.expected_value,
                    value_error,
                    vector.tolerance
                );
            }
        }
        Err(e) => {
            tracing::warn!("{}: {}", vector.file, e);
            outcome.error = Some(e.to_string());
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticGauge;
    use approx::assert_abs_diff_eq;

    fn vector(start: &str, end: &str, needle: &str, expected: f64) -> ReferenceVector {
        ReferenceVector {
            file: "gauge.png".to_string(),
            start_angle: start.to_string(),
            end_angle: end.to_string(),
            min_value: 0.0,
            max_value: 100.0,
            detected_angle: needle.to_string(),
            expected_value: expected,
            tolerance: 0.2,
            description: String::new(),
        }
    }

    #[test]
    fn expected_value_from_clock_strings() {
        let v = vector("7am", "5pm", "12", 50.0);
        assert_abs_diff_eq!(v.calculate_expected_value().unwrap(), 50.0, epsilon = 1e-9);
        let v = vector("210deg", "150deg", "2:00", 0.0);
        assert_abs_diff_eq!(v.calculate_expected_value().unwrap(), 70.0, epsilon = 1e-9);
        assert!(v.validate().iter().any(|p| p.contains("disagrees")));
    }

    #[test]
    fn validate_accepts_consistent_vector() {
        assert!(vector("7", "5", "2", 70.0).validate().is_empty());
    }

    #[test]
    fn validate_reports_labelling_mistakes() {
        let mut v = vector("7", "5", "6", 50.0);
        v.min_value = 100.0;
        v.max_value = 0.0;
        let problems = v.validate();
        assert!(problems.iter().any(|p| p.contains("less than")));
        assert!(problems.iter().any(|p| p.contains("outside the")));

        let bad_clock = vector("7", "half past", "3", 70.0);
        assert_eq!(bad_clock.validate().len(), 1);
    }

    #[test]
    fn tolerance_defaults_when_missing() {
        let v: ReferenceVector = serde_json::from_str(
            r#"{"file": "a.jpg", "start_angle": "7am", "end_angle": "5pm",
                "min_value": 0, "max_value": 10, "detected_angle": "12",
                "expected_value": 5}"#,
        )
        .unwrap();
        assert_eq!(v.tolerance, 0.2);
        assert!(v.description.is_empty());
        let cal = v.calibration().unwrap();
        assert_abs_diff_eq!(cal.min_angle_hours(), 7.0);
        assert_abs_diff_eq!(cal.max_angle_hours(), 5.0);
    }

    #[test]
    fn evaluates_rendered_gauges() {
        let dir = tempfile::tempdir().unwrap();
        // Needle at 1 o'clock: clock 30°, math 60°, value 60.
        let g = SyntheticGauge {
            needle_math_deg: 60.0,
            ..SyntheticGauge::default()
        };
        g.render().save(dir.path().join("gauge.png")).unwrap();

        let mut good = vector("7", "5", "1", 60.0);
        good.tolerance = 1.0;
        let mut wrong = good.clone();
        wrong.expected_value = 20.0;
        let mut missing = good.clone();
        missing.file = "missing.png".to_string();

        let report = evaluate_vectors(
            dir.path(),
            &[good, wrong, missing],
            &AnalogGaugeProcessor::default(),
        );
        let s = &report.summary;
        assert_eq!((s.total, s.passed, s.failed, s.errored), (3, 1, 1, 1));
        let first = &report.outcomes[0];
        assert!(first.angle_error_deg.unwrap() < 1.0);
        assert!(report.outcomes[2].error.as_deref().unwrap().contains("not found"));
        assert!(s.max_value_error.unwrap() > 39.0);
    }
}
