//! The per-frame decode and registration pipeline.
//!
//! raw bytes -> sensor grid -> contrast stretch -> false
//! color -> registration -> RGB buffer. Stages are pure;
//! each one runs inside a `debug` span, so enabling debug
//! logging prints per-stage timings.

use ndarray::Array2;
use serde_derive::*;
use tracing::{debug, instrument};

use crate::{
    colormap::Colormap,
    contrast::{ContrastSettings, ContrastStretch},
    error::Result,
    frame::{FrameDecoder, RawFrame, SensorGrid, SensorLayout},
    overlay::{encode, OverlayBuffer},
    reference::ReferenceFrame,
    registration::{Interpolation, Registrar, RegistrationParameters},
    temperature::FrameTemperatures,
};

/// Everything the pipeline needs besides the reference
/// frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub layout: SensorLayout,
    pub contrast: ContrastSettings,
    pub colormap: Colormap,
    pub registration: RegistrationParameters,
    pub interpolation: Interpolation,
    /// Color of destination pixels outside the sensor's
    /// footprint, channels in `[0, 1]`.
    pub fill: [f32; 3],
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            layout: SensorLayout::default(),
            contrast: ContrastSettings::default(),
            colormap: Colormap::default(),
            registration: RegistrationParameters::default(),
            interpolation: Interpolation::default(),
            fill: [0., 0., 0.],
        }
    }
}

/// Intermediate results of one frame.
#[derive(Debug, Clone)]
pub struct FrameStages {
    pub grid: SensorGrid,
    pub normalized: Array2<f64>,
    pub buffer: OverlayBuffer,
}

#[derive(Debug, Clone)]
pub struct OverlayPipeline {
    decoder: FrameDecoder,
    contrast: ContrastStretch,
    colormap: Colormap,
    registrar: Registrar,
}

impl OverlayPipeline {
    /// Validate the settings and build the stages. Fails
    /// with `InvalidCalibration` on degenerate registration
    /// parameters, and `InvalidConfig` on bad layouts or
    /// percentile bounds.
    pub fn new(settings: &PipelineSettings, reference: ReferenceFrame) -> Result<Self> {
        Ok(OverlayPipeline {
            decoder: FrameDecoder::new(settings.layout)?,
            contrast: ContrastStretch::new(settings.contrast)?,
            colormap: settings.colormap,
            registrar: Registrar::new(
                &settings.registration,
                reference,
                settings.interpolation,
                settings.fill,
            )?,
        })
    }

    pub fn layout(&self) -> &SensorLayout {
        self.decoder.layout()
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    pub fn process(&self, frame: &RawFrame) -> Result<OverlayBuffer> {
        Ok(self.process_stages(frame)?.buffer)
    }

    #[instrument(level = "debug", name = "frame", skip_all)]
    pub fn process_stages(&self, frame: &RawFrame) -> Result<FrameStages> {
        let grid = self.decoder.decode(frame)?;
        let temps = FrameTemperatures::from_grid(&grid);
        debug!(
            min_c = temps.stats.min,
            max_c = temps.stats.max,
            mean_c = temps.stats.mean().unwrap_or(f64::NAN),
            hottest = ?temps.hottest,
            "decoded frame"
        );

        let normalized = self.contrast.normalize(&grid);
        let colored = self.colormap.colorize(&normalized);
        let warped = self.registrar.warp(&colored);
        let buffer = encode(&warped);
        Ok(FrameStages {
            grid,
            normalized,
            buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::OverlayError, frame::ByteOrder, overlay::channel_to_byte};

    fn identity_settings() -> PipelineSettings {
        PipelineSettings {
            layout: SensorLayout {
                byte_order: ByteOrder::Little,
                ..SensorLayout::default()
            },
            registration: RegistrationParameters::identity(),
            ..PipelineSettings::default()
        }
    }

    fn cold_bytes() -> [u8; 3] {
        let [r, g, b] = Colormap::Spectral.coldest();
        [channel_to_byte(r), channel_to_byte(g), channel_to_byte(b)]
    }

    #[test]
    fn zero_frame_is_uniformly_cold() -> Result<()> {
        let pipeline = OverlayPipeline::new(&identity_settings(), ReferenceFrame::new(4, 16))?;
        let stages = pipeline.process_stages(&RawFrame::new(vec![0; 128]))?;

        assert_eq!(stages.grid.dim(), (16, 4));
        assert!(stages.grid.iter().all(|&v| v == 0.));
        assert!(stages.normalized.iter().all(|&v| v == 0.));

        let buf = stages.buffer;
        assert_eq!((buf.width(), buf.height()), (4, 16));
        assert_eq!(buf.as_bytes().len(), 4 * 16 * 3);
        let cold = cold_bytes();
        assert!(buf.as_bytes().chunks(3).all(|px| px == cold));
        Ok(())
    }

    #[test]
    fn single_hot_sample_lands_deterministically() -> Result<()> {
        let mut bytes = vec![0u8; 128];
        // sample 5 of the daemon's write order
        bytes[10..12].copy_from_slice(&u16::MAX.to_le_bytes());
        let frame = RawFrame::new(bytes);

        let pipeline = OverlayPipeline::new(&identity_settings(), ReferenceFrame::new(4, 16))?;
        let stages = pipeline.process_stages(&frame)?;

        // both axes flipped: sample 5 = (row 1, col 1) -> (14, 2)
        assert_eq!(stages.normalized[(14, 2)], 1.);
        assert_eq!(stages.normalized.iter().filter(|&&v| v == 1.).count(), 1);
        assert_eq!(stages.normalized.iter().filter(|&&v| v == 0.).count(), 63);

        let [r, g, b] = Colormap::Spectral.hottest();
        let hot = [channel_to_byte(r), channel_to_byte(g), channel_to_byte(b)];
        assert_eq!(stages.buffer.pixel(2, 14), Some(hot));
        assert_eq!(stages.buffer.pixel(0, 0), Some(cold_bytes()));

        let again = pipeline.process(&frame)?;
        assert_eq!(again, stages.buffer);
        Ok(())
    }

    #[test]
    fn reference_calibration_places_hot_sample() -> Result<()> {
        let settings = PipelineSettings {
            layout: SensorLayout {
                byte_order: ByteOrder::Little,
                ..SensorLayout::default()
            },
            interpolation: Interpolation::Nearest,
            ..PipelineSettings::default()
        };
        let pipeline = OverlayPipeline::new(&settings, ReferenceFrame::new(640, 480))?;

        let mut bytes = vec![0u8; 128];
        bytes[10..12].copy_from_slice(&u16::MAX.to_le_bytes());
        let buf = pipeline.process(&RawFrame::new(bytes))?;
        assert_eq!((buf.width(), buf.height()), (640, 480));

        // grid cell (row 14, col 2) is forwarded to
        // x = 530 - 36.4 * 14, y = 170 + 36.2 * 2
        let [r, g, b] = Colormap::Spectral.hottest();
        let hot = [channel_to_byte(r), channel_to_byte(g), channel_to_byte(b)];
        assert_eq!(buf.pixel(20, 242), Some(hot));
        // far corner is outside the sensor's footprint
        assert_eq!(buf.pixel(639, 479), Some([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn short_frame_fails() -> Result<()> {
        let pipeline = OverlayPipeline::new(&identity_settings(), ReferenceFrame::new(4, 16))?;
        assert!(matches!(
            pipeline.process(&RawFrame::new(vec![0; 100])),
            Err(OverlayError::FrameSizeMismatch {
                expected: 128,
                found: 100
            })
        ));
        Ok(())
    }

    #[test]
    fn degenerate_calibration_fails_construction() {
        let settings = PipelineSettings {
            registration: RegistrationParameters {
                scale_y: 0.,
                ..RegistrationParameters::default()
            },
            ..PipelineSettings::default()
        };
        assert!(matches!(
            OverlayPipeline::new(&settings, ReferenceFrame::new(640, 480)),
            Err(OverlayError::InvalidCalibration(_))
        ));
    }
}
