//! Destinations for intermediate diagnostic images.
//!
//! The pipeline hands every artifact to a [`DebugSink`] and moves on; a sink
//! failure is logged and never changes the reading.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

/// Pipeline stage an artifact was captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStage {
    /// Acquired image after cropping.
    Cropped,
    /// Grayscale working image.
    Grayscale,
    /// Color rendering of the detections.
    Overlay,
}

impl ArtifactStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cropped => "cropped",
            Self::Grayscale => "grayscale",
            Self::Overlay => "overlay",
        }
    }
}

/// One named intermediate image.
#[derive(Debug, Clone)]
pub struct DebugArtifact {
    pub stage: ArtifactStage,
    pub image: DynamicImage,
}

#[derive(Debug, Error)]
pub enum DebugSinkError {
    #[error("failed to create debug directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write debug image {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub trait DebugSink {
    fn accept(&mut self, artifact: &DebugArtifact) -> Result<(), DebugSinkError>;
}

/// Keep only alphanumerics, space, `-` and `_`; spaces become `_`.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Writes `<sensor>_<stage>_<label>.png` files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDebugSink {
    dir: PathBuf,
    sensor: String,
    label: String,
}

impl DirectoryDebugSink {
    pub fn new(dir: impl Into<PathBuf>, sensor_name: &str) -> Self {
        Self {
            dir: dir.into(),
            sensor: sanitize_name(sensor_name),
            label: "debug".to_string(),
        }
    }

    /// Replace the trailing file label (defaults to `debug`).
    pub fn with_label(mut self, label: &str) -> Self {
        let clean = sanitize_name(label);
        if !clean.is_empty() {
            self.label = clean;
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: ArtifactStage) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.png", self.sensor, stage.as_str(), self.label))
    }
}

impl DebugSink for DirectoryDebugSink {
    fn accept(&mut self, artifact: &DebugArtifact) -> Result<(), DebugSinkError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DebugSinkError::CreateDir {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path_for(artifact.stage);
        artifact
            .image
            .save(&path)
            .map_err(|e| DebugSinkError::Write {
                path: path.clone(),
                source: e,
            })?;
        tracing::debug!("saved {} debug image to {}", artifact.stage.as_str(), path.display());
        Ok(())
    }
}

/// Collects artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDebugSink {
    pub artifacts: Vec<DebugArtifact>,
}

impl MemoryDebugSink {
    pub fn get(&self, stage: ArtifactStage) -> Option<&DebugArtifact> {
        self.artifacts.iter().find(|a| a.stage == stage)
    }

    pub fn stages(&self) -> Vec<ArtifactStage> {
        self.artifacts.iter().map(|a| a.stage).collect()
    }
}

impl DebugSink for MemoryDebugSink {
    fn accept(&mut self, artifact: &DebugArtifact) -> Result<(), DebugSinkError> {
        self.artifacts.push(artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn sanitizes_sensor_names() {
        assert_eq!(sanitize_name("Boiler Pressure #2"), "Boiler_Pressure_2");
        assert_eq!(sanitize_name("  a/b\\c-d_e "), "abc-d_e");
    }

    #[test]
    fn directory_sink_writes_named_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let mut sink = DirectoryDebugSink::new(&out, "Water Meter").with_label("frame 1");
        let artifact = DebugArtifact {
            stage: ArtifactStage::Grayscale,
            image: DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([50]))),
        };
        sink.accept(&artifact).unwrap();

        let path = out.join("Water_Meter_grayscale_frame_1.png");
        assert_eq!(sink.path_for(ArtifactStage::Grayscale), path);
        let back = image::open(&path).unwrap().to_luma8();
        assert_eq!(back.get_pixel(1, 1)[0], 50);
    }

    #[test]
    fn directory_sink_reports_unwritable_target() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut sink = DirectoryDebugSink::new(blocker.join("sub"), "s");
        let artifact = DebugArtifact {
            stage: ArtifactStage::Overlay,
            image: DynamicImage::ImageLuma8(GrayImage::new(2, 2)),
        };
        assert!(matches!(
            sink.accept(&artifact),
            Err(DebugSinkError::CreateDir { .. })
        ));
    }
}
