//! JSON session configuration.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde_derive::*;

use crate::{
    colormap::Colormap,
    contrast::ContrastSettings,
    frame::SensorLayout,
    overlay::OverlaySettings,
    pipeline::PipelineSettings,
    reference::ReferenceConfig,
    registration::{Interpolation, RegistrationParameters},
    session::{FramePolicy, LoopSettings},
    surface::SurfaceTarget,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Named pipe (or file) the sensor daemon writes to.
    pub path: PathBuf,
    #[serde(flatten)]
    pub layout: SensorLayout,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            path: PathBuf::from("/var/run/mlx90621.sock"),
            layout: SensorLayout::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    #[serde(flatten)]
    pub settings: OverlaySettings,
    pub target: SurfaceTarget,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub sensor: SensorConfig,
    pub registration: RegistrationParameters,
    pub contrast: ContrastSettings,
    pub colormap: Colormap,
    pub interpolation: Interpolation,
    pub fill: [f32; 3],
    pub reference: ReferenceConfig,
    pub overlay: OverlayConfig,
    pub tick_ms: u64,
    pub read_timeout_ms: u64,
    pub max_read_retries: u32,
    pub frame_policy: FramePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let pipeline = PipelineSettings::default();
        SessionConfig {
            sensor: SensorConfig::default(),
            registration: pipeline.registration,
            contrast: pipeline.contrast,
            colormap: pipeline.colormap,
            interpolation: pipeline.interpolation,
            fill: pipeline.fill,
            reference: ReferenceConfig::default(),
            overlay: OverlayConfig::default(),
            tick_ms: 250,
            read_timeout_ms: 1000,
            max_read_retries: 3,
            frame_policy: FramePolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            layout: self.sensor.layout,
            contrast: self.contrast,
            colormap: self.colormap,
            registration: self.registration,
            interpolation: self.interpolation,
            fill: self.fill,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            tick: Duration::from_millis(self.tick_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_read_retries: self.max_read_retries,
            frame_policy: self.frame_policy,
        }
    }
}
