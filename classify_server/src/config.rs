//! Demo configuration.
//!
use std::{path::PathBuf, time::Duration};

use anyhow::Result;

use crate::{sensors::WebcamOptions, utils::ResourceLocation};

#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Directory holding the model files
    pub model_base: ResourceLocation,
    pub model_file: String,
    pub metadata_file: String,
    pub webcam: WebcamOptions,
    /// Frame clock rate of the prediction loop
    pub frame_rate: u32,
    /// Stop the loop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            model_base: ResourceLocation::Local(PathBuf::from("./model/")),
            model_file: "model.onnx".to_string(),
            metadata_file: "metadata.json".to_string(),
            webcam: WebcamOptions::default(),
            frame_rate: 60,
            max_frames: None,
        }
    }
}

impl DemoConfig {
    pub fn model_url(&self) -> Result<ResourceLocation> {
        self.model_base.join(&self.model_file)
    }

    pub fn metadata_url(&self) -> Result<ResourceLocation> {
        self.model_base.join(&self.metadata_file)
    }

    /// Period of the frame clock, at least one nanosecond.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
            .max(Duration::from_nanos(1))
    }
}
