//! Versioned JSON report of one pipeline run.

use serde::{Deserialize, Serialize};

use crate::calibration::GaugeCalibration;
use crate::circle::{Circle, CircleSearch};
use crate::mapper::MappedValue;
use crate::needle::NeedleDetection;
use crate::processor::{GaugeReading, ProcessorConfig};

pub const DEBUG_SCHEMA_V1: &str = "gaugeread.debug.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugDump {
    pub schema_version: String,
    pub image: ImageDebug,
    pub config: ProcessorConfig,
    pub calibration: GaugeCalibration,
    pub stages: StagesDebug,
    pub outcome: OutcomeDebug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDebug {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mean_intensity: f32,
    pub min_intensity: u8,
    pub max_intensity: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagesDebug {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle: Option<CircleSearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needle: Option<NeedleDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappedValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeDebug {
    Reading {
        reading: GaugeReading,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        circle: Option<Circle>,
    },
}

impl DebugDump {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}
