//! Error taxonomy for the gauge-reading pipeline.
//!
//! Hard failures are `Err` values of [`GaugeError`]. Soft conditions (a dim
//! needle, a value outside the calibrated sweep) never abort a run; they are
//! attached to the returned reading as [`ReadingWarning`](crate::ReadingWarning).

use thiserror::Error;

use crate::circle::Circle;
use crate::needle::AngleCandidate;
use crate::source::CropError;

/// Errors raised by the core pipeline.
#[derive(Debug, Clone, Error)]
pub enum GaugeError {
    /// No gauge-face circle cleared the vote threshold.
    #[error("no gauge circle detected in {width}x{height} image: {reason}")]
    NoCircleDetected {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Which stage of the locator gave up.
        reason: String,
    },

    /// The needle scan produced no valid ray inside the image.
    #[error(
        "no needle detected around circle at ({:.1}, {:.1}) r={:.1}",
        circle.center_x,
        circle.center_y,
        circle.radius
    )]
    NoNeedleDetected {
        /// The gauge face the scan ran against.
        circle: Circle,
        /// Whatever candidates were scored before giving up (possibly empty).
        candidates: Vec<AngleCandidate>,
    },

    /// The calibration cannot describe a usable sweep.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// A configuration value is outside its meaningful range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured crop rectangle does not fit the acquired image.
    #[error(transparent)]
    Crop(#[from] CropError),

    /// A clock-position string could not be parsed.
    #[error("invalid clock position {input:?}: {reason}")]
    InvalidClockPosition {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl GaugeError {
    /// Creates an invalid-calibration error.
    pub fn invalid_calibration(msg: impl Into<String>) -> Self {
        Self::InvalidCalibration(msg.into())
    }

    /// Creates an invalid-configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Circle attached to the failure, if the run got that far.
    pub fn circle(&self) -> Option<&Circle> {
        match self {
            Self::NoNeedleDetected { circle, .. } => Some(circle),
            _ => None,
        }
    }

    /// Returns `true` for failures caused by image content rather than setup.
    pub fn is_detection_failure(&self) -> bool {
        matches!(
            self,
            Self::NoCircleDetected { .. } | Self::NoNeedleDetected { .. }
        )
    }
}

/// Result alias for core operations.
pub type GaugeResult<T> = Result<T, GaugeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_needle_error_exposes_circle() {
        let circle = Circle {
            center_x: 10.0,
            center_y: 12.0,
            radius: 5.0,
            coverage: 1.0,
            votes: 40,
        };
        let err = GaugeError::NoNeedleDetected {
            circle,
            candidates: Vec::new(),
        };
        assert!(err.is_detection_failure());
        assert_eq!(err.circle().map(|c| c.radius), Some(5.0));
        assert!(err.to_string().contains("r=5.0"));
    }

    #[test]
    fn calibration_error_is_not_detection_failure() {
        let err = GaugeError::invalid_calibration("zero sweep");
        assert!(!err.is_detection_failure());
        assert_eq!(err.to_string(), "invalid calibration: zero sweep");
    }
}
