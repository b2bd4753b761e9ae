//! gaugeread: classical-CV reader for analog needle gauges.
//!
//! The pipeline stages are:
//!
//! 1. **Preprocess** – grayscale working image, optional histogram equalization.
//! 2. **Circle** – gauge-face localization by gradient-voting Hough
//!    accumulation, radius histogram and least-squares refit.
//! 3. **Needle** – radial darkness scan from the face center with sub-degree
//!    refinement and a confidence estimate.
//! 4. **Mapping** – math-to-clock angle conversion and wraparound-aware
//!    interpolation against a [`GaugeCalibration`].
//!
//! # Public API
//! - [`AnalogGaugeProcessor`] with [`ProcessorConfig`] as the entry point
//! - [`GaugeCalibration`] and [`GaugeReading`] at the edges
//! - the individual stages ([`locate_circle`], [`detect_needle`],
//!   [`map_angle`]) for callers that want to drive them separately
//! - collaborators: [`ImageSource`], [`crop`], [`DebugSink`]

pub mod calibration;
pub mod circle;
pub mod debug_dump;
pub mod debug_sink;
pub mod error;
pub mod geometry;
pub mod mapper;
pub mod needle;
pub mod overlay;
pub mod preprocess;
pub mod processor;
pub mod source;
pub mod synthetic;
pub mod vectors;

pub use calibration::GaugeCalibration;
pub use circle::{locate_circle, search_circles, Circle, CircleLocatorConfig, CircleSearch};
pub use debug_dump::{DebugDump, DEBUG_SCHEMA_V1};
pub use debug_sink::{
    ArtifactStage, DebugArtifact, DebugSink, DebugSinkError, DirectoryDebugSink, MemoryDebugSink,
};
pub use error::{GaugeError, GaugeResult};
pub use mapper::{map_angle, MappedValue, OutOfRangePolicy};
pub use needle::{detect_needle, AngleCandidate, NeedleDetection, NeedleDetectorConfig};
pub use preprocess::PreprocessConfig;
pub use processor::{AnalogGaugeProcessor, GaugeReading, ProcessorConfig, ReadingWarning};
pub use source::{
    crop, AcquisitionError, CropError, CropRect, FileImageSource, ImageSource, MemoryImageSource,
};
pub use synthetic::SyntheticGauge;
pub use vectors::{evaluate_vectors, ReferenceVector, VectorOutcome, VectorReport, VectorSummary};
