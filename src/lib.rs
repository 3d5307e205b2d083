//! Live thermal overlay for a low resolution thermopile
//! array sensor and a visible light camera preview.
//!
//! A sensor daemon writes fixed-length frames of raw
//! samples to a named pipe. Each frame is turned into an
//! RGB buffer aligned with the camera image:
//!
//! 1. [decode](frame::FrameDecoder) the bytes into a
//! [`SensorGrid`](frame::SensorGrid), flipping both axes
//! into display orientation;
//! 2. [stretch the contrast](contrast::ContrastStretch)
//! between the 2nd and 98th percentiles;
//! 3. [false color](colormap::Colormap) the normalized
//! intensities;
//! 4. [register](registration::Registrar) the colored grid
//! into the reference frame with an affine transform;
//! 5. [encode](overlay::encode) the result as 8-bit RGB.
//!
//! [`OverlayPipeline`] chains these stages, and
//! [`OverlayLoop`] drives it on a fixed tick against a
//! [`FrameSource`](source::FrameSource) and an
//! [`OverlaySurface`](surface::OverlaySurface).
//!
//! # Usage
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use thermal_overlay::{
//!     OverlayPipeline, PipelineSettings, RawFrame, ReferenceFrame,
//! };
//!
//! let pipeline = OverlayPipeline::new(
//!     &PipelineSettings::default(),
//!     ReferenceFrame::new(640, 480),
//! )?;
//! let buffer = pipeline.process(&RawFrame::new(vec![0; 128]))?;
//! assert_eq!(buffer.as_bytes().len(), 640 * 480 * 3);
//! # Ok(())
//! # }
//! ```

mod parse;

pub mod error;
pub mod frame;
pub mod stats;
pub mod temperature;

pub mod colormap;
pub mod contrast;
pub mod overlay;
pub mod reference;
pub mod registration;

pub mod pipeline;
pub mod session;
pub mod source;
pub mod surface;

pub mod cli;
pub mod config;
pub mod logger;

pub use crate::config::SessionConfig;
pub use crate::error::{OverlayError, Result};
pub use crate::frame::{FrameDecoder, RawFrame, SensorGrid, SensorLayout};
pub use crate::overlay::OverlayBuffer;
pub use crate::pipeline::{OverlayPipeline, PipelineSettings};
pub use crate::reference::ReferenceFrame;
pub use crate::session::{OverlayLoop, StopHandle};
