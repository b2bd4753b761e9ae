//! End-to-end reading of one gauge image.

use std::path::Path;

use image::DynamicImage;

use crate::calibration::GaugeCalibration;
use crate::circle::{self, Circle, CircleLocatorConfig};
use crate::debug_dump::{DebugDump, ImageDebug, OutcomeDebug, StagesDebug, DEBUG_SCHEMA_V1};
use crate::debug_sink::{ArtifactStage, DebugArtifact, DebugSink};
use crate::error::{GaugeError, GaugeResult};
use crate::mapper::{self, OutOfRangePolicy};
use crate::needle::{self, AngleCandidate, NeedleDetectorConfig};
use crate::overlay::{self, OverlayInput};
use crate::preprocess::{self, PreprocessConfig};
use crate::source::{self, CropRect};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Rectangle cut from the input before anything else runs.
    pub crop: Option<CropRect>,
    pub preprocess: PreprocessConfig,
    pub circle: CircleLocatorConfig,
    pub needle: NeedleDetectorConfig,
    pub out_of_range: OutOfRangePolicy,
    /// Hand intermediate images to the debug sink when one is supplied.
    pub diagnostics_enabled: bool,
}

impl ProcessorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Non-fatal condition attached to a reading.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadingWarning {
    /// Needle barely darker than the face or not clearly better than other rays.
    LowConfidence { confidence: f32, best_score: f32 },
    /// Needle inside the dead sector of the dial.
    OutOfRange {
        raw_value: f64,
        min_value: f64,
        max_value: f64,
    },
}

/// Calibrated output of one successful run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GaugeReading {
    pub value: f64,
    /// Interpolated value before the out-of-range policy.
    pub raw_value: f64,
    pub units: String,
    pub needle_angle_math_degrees: f64,
    pub needle_angle_clock_degrees: f64,
    pub confidence: f32,
    pub circle: Circle,
    pub warnings: Vec<ReadingWarning>,
}

impl GaugeReading {
    pub fn is_low_confidence(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ReadingWarning::LowConfidence { .. }))
    }

    pub fn is_out_of_range(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ReadingWarning::OutOfRange { .. }))
    }
}

/// Stateless gauge reader; one instance can serve many threads.
#[derive(Debug, Clone, Default)]
pub struct AnalogGaugeProcessor {
    config: ProcessorConfig,
}

#[derive(Default)]
struct RunTrace {
    image: Option<ImageDebug>,
    stages: StagesDebug,
}

impl AnalogGaugeProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProcessorConfig {
        &mut self.config
    }

    /// Read one image.
    ///
    /// Stops at the first hard failure. When diagnostics are enabled, the
    /// sink receives the cropped, grayscale and overlay images even if the
    /// run fails.
    pub fn process(
        &self,
        image: &DynamicImage,
        calibration: &GaugeCalibration,
        mut sink: Option<&mut dyn DebugSink>,
    ) -> GaugeResult<GaugeReading> {
        self.run(image, calibration, &mut sink, &mut RunTrace::default())
    }

    /// Read one image and return a debug dump alongside the result.
    pub fn process_with_dump(
        &self,
        image: &DynamicImage,
        calibration: &GaugeCalibration,
        mut sink: Option<&mut dyn DebugSink>,
    ) -> (GaugeResult<GaugeReading>, DebugDump) {
        let mut trace = RunTrace::default();
        let result = self.run(image, calibration, &mut sink, &mut trace);
        let outcome = match &result {
            Ok(reading) => OutcomeDebug::Reading {
                reading: reading.clone(),
            },
            Err(e) => OutcomeDebug::Failed {
                error: e.to_string(),
                circle: trace
                    .stages
                    .circle
                    .as_ref()
                    .and_then(|s| s.best)
                    .or_else(|| e.circle().copied()),
            },
        };
        let image_debug = trace.image.unwrap_or(ImageDebug {
            source: None,
            width: image.width(),
            height: image.height(),
            mean_intensity: 0.0,
            min_intensity: 0,
            max_intensity: 0,
        });
        let dump = DebugDump {
            schema_version: DEBUG_SCHEMA_V1.to_string(),
            image: image_debug,
            config: self.config.clone(),
            calibration: calibration.clone(),
            stages: trace.stages,
            outcome,
        };
        (result, dump)
    }

    fn emit(
        &self,
        sink: &mut Option<&mut dyn DebugSink>,
        stage: ArtifactStage,
        image: impl FnOnce() -> DynamicImage,
    ) {
        if !self.config.diagnostics_enabled {
            return;
        }
        let Some(sink) = sink.as_mut() else {
            return;
        };
        let artifact = DebugArtifact {
            stage,
            image: image(),
        };
        if let Err(e) = sink.accept(&artifact) {
            tracing::warn!("debug sink rejected {} image: {}", stage.as_str(), e);
        }
    }

    fn run(
        &self,
        image: &DynamicImage,
        calibration: &GaugeCalibration,
        sink: &mut Option<&mut dyn DebugSink>,
        trace: &mut RunTrace,
    ) -> GaugeResult<GaugeReading> {
        let cfg = &self.config;

        let cropped;
        let input = match cfg.crop {
            Some(rect) => {
                cropped = source::crop(image, rect)?;
                self.emit(sink, ArtifactStage::Cropped, || cropped.clone());
                &cropped
            }
            None => image,
        };

        let gray = preprocess::normalize(input, &cfg.preprocess);
        let (mean, lo, hi) = preprocess::intensity_stats(&gray);
        trace.image = Some(ImageDebug {
            source: None,
            width: gray.width(),
            height: gray.height(),
            mean_intensity: mean,
            min_intensity: lo,
            max_intensity: hi,
        });
        self.emit(sink, ArtifactStage::Grayscale, || {
            DynamicImage::ImageLuma8(gray.clone())
        });

        let render = |circle: Option<&Circle>, angle: Option<f64>, cands: &[AngleCandidate]| {
            let input = OverlayInput {
                circle,
                needle_angle_deg: angle,
                candidates: cands,
            };
            DynamicImage::ImageRgb8(overlay::render_overlay(&gray, &input))
        };

        let search = circle::search_circles(&gray, &cfg.circle)?;
        let found = search.best_circle(&cfg.circle);
        trace.stages.circle = Some(search);
        let circle = match found {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("{}", e);
                self.emit(sink, ArtifactStage::Overlay, || render(None, None, &[]));
                return Err(e);
            }
        };
        tracing::debug!(
            "gauge circle at ({:.1}, {:.1}) r={:.1} coverage={:.2}",
            circle.center_x,
            circle.center_y,
            circle.radius,
            circle.coverage
        );

        let detection = match needle::detect_needle(&gray, &circle, &cfg.needle) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{}", e);
                let cands = match &e {
                    GaugeError::NoNeedleDetected { candidates, .. } => candidates.as_slice(),
                    _ => &[],
                };
                self.emit(sink, ArtifactStage::Overlay, || {
                    render(Some(&circle), None, cands)
                });
                return Err(e);
            }
        };
        self.emit(sink, ArtifactStage::Overlay, || {
            render(
                Some(&circle),
                Some(detection.angle_degrees),
                &detection.candidates,
            )
        });

        let mapped = mapper::map_angle(detection.angle_degrees, calibration, cfg.out_of_range)?;
        let mut warnings = Vec::new();
        if detection.low_confidence {
            tracing::warn!(
                "low-confidence needle: score {:.1}, confidence {:.2}",
                detection.best_score,
                detection.confidence
            );
            warnings.push(ReadingWarning::LowConfidence {
                confidence: detection.confidence,
                best_score: detection.best_score,
            });
        }
        if mapped.out_of_range {
            tracing::warn!(
                "needle at {:.1}° clock is outside the calibrated sweep; raw value {:.3}",
                mapped.needle_angle_clock_degrees,
                mapped.raw_value
            );
            warnings.push(ReadingWarning::OutOfRange {
                raw_value: mapped.raw_value,
                min_value: calibration.min_value(),
                max_value: calibration.max_value(),
            });
        }

        let reading = GaugeReading {
            value: mapped.value,
            raw_value: mapped.raw_value,
            units: calibration.units().to_string(),
            needle_angle_math_degrees: mapped.needle_angle_math_degrees,
            needle_angle_clock_degrees: mapped.needle_angle_clock_degrees,
            confidence: detection.confidence,
            circle,
            warnings,
        };
        tracing::info!(
            "gauge reading {:.3}{} | needle {:.2}° math, {:.2}° clock | range {}..{} over {:.1}h..{:.1}h | confidence {:.2}",
            reading.value,
            reading.units,
            reading.needle_angle_math_degrees,
            reading.needle_angle_clock_degrees,
            calibration.min_value(),
            calibration.max_value(),
            calibration.min_angle_hours(),
            calibration.max_angle_hours(),
            reading.confidence
        );

        trace.stages.needle = Some(detection);
        trace.stages.mapping = Some(mapped);
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_sink::{DebugSinkError, MemoryDebugSink};
    use crate::synthetic::SyntheticGauge;
    use image::{GrayImage, Luma};

    fn reference_gauge(needle_math_deg: f64) -> DynamicImage {
        let g = SyntheticGauge {
            width: 300,
            height: 300,
            center: [200.0, 200.0],
            radius: 66.0,
            needle_math_deg,
            ..SyntheticGauge::default()
        };
        DynamicImage::ImageLuma8(g.render())
    }

    fn diagnostics_on() -> AnalogGaugeProcessor {
        AnalogGaugeProcessor::new(ProcessorConfig {
            diagnostics_enabled: true,
            ..Default::default()
        })
    }

    #[test]
    fn reads_reference_gauge() {
        let processor = AnalogGaugeProcessor::default();
        let cal = GaugeCalibration::default();
        let reading = processor.process(&reference_gauge(142.5), &cal, None).unwrap();
        assert!((reading.needle_angle_math_degrees - 142.5).abs() < 1.0, "{reading:?}");
        assert!((reading.needle_angle_clock_degrees - 307.5).abs() < 1.0);
        assert!((reading.value - 32.5).abs() < 0.5, "{reading:?}");
        assert!((reading.circle.center_x - 200.0).abs() < 2.0);
        assert!((reading.circle.radius - 66.0).abs() < 3.0);
        assert!(reading.warnings.is_empty(), "{:?}", reading.warnings);
    }

    #[test]
    fn reads_needle_near_full_scale() {
        let processor = AnalogGaugeProcessor::default();
        let reading = processor
            .process(&reference_gauge(307.5), &GaugeCalibration::default(), None)
            .unwrap();
        assert!((reading.needle_angle_clock_degrees - 142.5).abs() < 1.0);
        assert!((reading.value - 97.5).abs() < 0.5, "{reading:?}");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let processor = AnalogGaugeProcessor::default();
        let cal = GaugeCalibration::default();
        let img = reference_gauge(61.0);
        let a = processor.process(&img, &cal, None).unwrap();
        let b = processor.process(&img, &cal, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn processor_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnalogGaugeProcessor>();
        assert_send_sync::<GaugeCalibration>();

        let processor = AnalogGaugeProcessor::default();
        let cal = GaugeCalibration::default();
        let angles = [100.0, 20.0, 230.0];
        let readings: Vec<f64> = std::thread::scope(|s| {
            let handles: Vec<_> = angles
                .iter()
                .map(|&a| {
                    let (processor, cal) = (&processor, &cal);
                    s.spawn(move || {
                        processor.process(&reference_gauge(a), cal, None)
                            .map(|r| r.needle_angle_math_degrees)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        for (got, want) in readings.iter().zip(angles) {
            assert!(crate::geometry::angular_distance(*got, want) < 1.0);
        }
    }

    #[test]
    fn blank_image_fails_but_still_emits_artifacts() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 90, Luma([200])));
        let mut sink = MemoryDebugSink::default();
        let err = diagnostics_on()
            .process(&img, &GaugeCalibration::default(), Some(&mut sink))
            .unwrap_err();
        assert!(matches!(err, GaugeError::NoCircleDetected { .. }));
        assert_eq!(
            sink.stages(),
            vec![ArtifactStage::Grayscale, ArtifactStage::Overlay]
        );
    }

    /// Rejects every artifact as if the disk were full.
    #[derive(Default)]
    struct FailingSink {
        attempts: usize,
    }

    impl DebugSink for FailingSink {
        fn accept(&mut self, artifact: &DebugArtifact) -> Result<(), DebugSinkError> {
            self.attempts += 1;
            Err(DebugSinkError::CreateDir {
                path: std::path::PathBuf::from(artifact.stage.as_str()),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
    }

    #[test]
    fn failing_sink_does_not_change_the_reading() {
        let cal = GaugeCalibration::default();
        let img = reference_gauge(142.5);
        let expected = AnalogGaugeProcessor::default()
            .process(&img, &cal, None)
            .unwrap();
        let mut sink = FailingSink::default();
        let reading = diagnostics_on().process(&img, &cal, Some(&mut sink)).unwrap();
        assert_eq!(reading, expected);
        assert_eq!(sink.attempts, 2);
    }

    #[test]
    fn tiny_image_is_no_circle() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([90])));
        let mut sink = MemoryDebugSink::default();
        let err = diagnostics_on()
            .process(&img, &GaugeCalibration::default(), Some(&mut sink))
            .unwrap_err();
        assert!(matches!(
            err,
            GaugeError::NoCircleDetected {
                width: 5,
                height: 5,
                ..
            }
        ));
        assert_eq!(
            sink.stages(),
            vec![ArtifactStage::Grayscale, ArtifactStage::Overlay]
        );
    }

    #[test]
    fn diagnostics_disabled_emits_nothing() {
        let mut sink = MemoryDebugSink::default();
        AnalogGaugeProcessor::default()
            .process(&reference_gauge(10.0), &GaugeCalibration::default(), Some(&mut sink))
            .unwrap();
        assert!(sink.artifacts.is_empty());
    }

    #[test]
    fn successful_run_emits_overlay() {
        let mut sink = MemoryDebugSink::default();
        diagnostics_on()
            .process(&reference_gauge(10.0), &GaugeCalibration::default(), Some(&mut sink))
            .unwrap();
        let overlay = sink.get(ArtifactStage::Overlay).unwrap();
        assert_eq!((overlay.image.width(), overlay.image.height()), (300, 300));
        assert!(overlay.image.as_rgb8().is_some());
    }

    #[test]
    fn dead_sector_needle_is_flagged_or_clamped() {
        let cal = GaugeCalibration::default();
        // Clock 165°, just past the 5 o'clock end.
        let img = reference_gauge(285.0);
        let reported = AnalogGaugeProcessor::default()
            .process(&img, &cal, None)
            .unwrap();
        assert!(reported.is_out_of_range());
        assert!(reported.value > 100.0);

        let clamped = AnalogGaugeProcessor::new(ProcessorConfig {
            out_of_range: OutOfRangePolicy::Clamp,
            ..Default::default()
        })
        .process(&img, &cal, None)
        .unwrap();
        assert!(clamped.is_out_of_range());
        assert_eq!(clamped.value, 100.0);
        assert!(clamped.raw_value > 100.0);
    }

    #[test]
    fn faint_needle_still_reads_with_warning() {
        let g = SyntheticGauge {
            needle_intensity: 215,
            ..SyntheticGauge::default()
        };
        let reading = AnalogGaugeProcessor::default()
            .process(
                &DynamicImage::ImageLuma8(g.render()),
                &GaugeCalibration::default(),
                None,
            )
            .unwrap();
        assert!(reading.is_low_confidence());
        assert!(!reading.is_out_of_range());
    }

    #[test]
    fn crop_is_applied_first() {
        let g = SyntheticGauge {
            width: 400,
            height: 300,
            center: [150.0, 150.0],
            radius: 80.0,
            needle_math_deg: 120.0,
            ..SyntheticGauge::default()
        };
        let img = DynamicImage::ImageLuma8(g.render());
        let mut processor = diagnostics_on();
        processor.config_mut().crop = Some(CropRect {
            x: 50,
            y: 50,
            width: 200,
            height: 200,
        });
        let mut sink = MemoryDebugSink::default();
        let reading = processor
            .process(&img, &GaugeCalibration::default(), Some(&mut sink))
            .unwrap();
        assert!((reading.circle.center_x - 100.0).abs() < 2.0);
        assert!((reading.needle_angle_math_degrees - 120.0).abs() < 1.0);
        let cropped = sink.get(ArtifactStage::Cropped).unwrap();
        assert_eq!(cropped.image.width(), 200);

        processor.config_mut().crop = Some(CropRect {
            x: 300,
            y: 0,
            width: 200,
            height: 200,
        });
        assert!(matches!(
            processor.process(&img, &GaugeCalibration::default(), None),
            Err(GaugeError::Crop(_))
        ));
    }

    #[test]
    fn dump_records_every_stage() {
        let (result, dump) = AnalogGaugeProcessor::default().process_with_dump(
            &reference_gauge(142.5),
            &GaugeCalibration::default(),
            None,
        );
        let reading = result.unwrap();
        assert_eq!(dump.schema_version, DEBUG_SCHEMA_V1);
        assert_eq!((dump.image.width, dump.image.height), (300, 300));
        assert!(dump.stages.circle.as_ref().is_some_and(|c| c.best.is_some()));
        let needle = dump.stages.needle.as_ref().unwrap();
        assert!(!needle.candidates.is_empty());
        assert_eq!(dump.stages.mapping.unwrap().value, reading.value);

        let json = dump.to_json_pretty().unwrap();
        assert!(json.contains("\"status\": \"reading\""));
        let back: DebugDump = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema_version, DEBUG_SCHEMA_V1);
    }

    #[test]
    fn dump_on_failure_keeps_error() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([0])));
        let (result, dump) = AnalogGaugeProcessor::default().process_with_dump(
            &img,
            &GaugeCalibration::default(),
            None,
        );
        assert!(result.is_err());
        match dump.outcome {
            OutcomeDebug::Failed { error, circle } => {
                assert!(error.contains("no gauge circle"));
                assert!(circle.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(dump.stages.needle.is_none());
    }

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let cfg: ProcessorConfig =
            serde_json::from_str(r#"{"needle": {"too_bright_score": 180}, "out_of_range": "clamp"}"#)
                .unwrap();
        assert_eq!(cfg.needle.too_bright_score, 180.0);
        assert_eq!(cfg.needle.top_k, 10);
        assert_eq!(cfg.out_of_range, OutOfRangePolicy::Clamp);
        assert!(cfg.crop.is_none());
    }
}
