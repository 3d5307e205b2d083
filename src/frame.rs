//! Raw sensor frames and their decoding into a
//! [`SensorGrid`].
//!
//! The sensor daemon writes one frame as `rows * cols`
//! packed unsigned samples in its own byte order. The array
//! is mounted upside down relative to the camera, so the
//! decoded grid is read back with both axes reversed.

use byteordered::{ByteOrdered, Endianness};
use itertools::iproduct;
use ndarray::Array2;
use serde_derive::*;
use tracing::instrument;

use crate::{
    error::{OverlayError, Result},
    parse::{parse_samples, Parseable},
};

/// Decoded sensor samples, `(rows, cols)`, in raw sample
/// units.
pub type SensorGrid = Array2<f64>;

/// One payload read off the sensor source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        RawFrame { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(bytes: Vec<u8>) -> Self {
        RawFrame::new(bytes)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleWidth {
    U8,
    U16,
    U32,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::U8 => u8::WIDTH,
            SampleWidth::U16 => u16::WIDTH,
            SampleWidth::U32 => u32::WIDTH,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Native,
    Little,
    Big,
}

impl ByteOrder {
    fn endianness(self) -> Endianness {
        match self {
            ByteOrder::Native => Endianness::native(),
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
        }
    }
}

/// Shape and encoding of the frames written by the sensor
/// daemon.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SensorLayout {
    pub rows: usize,
    pub cols: usize,
    pub sample: SampleWidth,
    pub byte_order: ByteOrder,
}

impl Default for SensorLayout {
    /// MLX90621: 16x4 thermopiles, one native `u16` each.
    fn default() -> Self {
        SensorLayout {
            rows: 16,
            cols: 4,
            sample: SampleWidth::U16,
            byte_order: ByteOrder::Native,
        }
    }
}

impl SensorLayout {
    pub fn num_samples(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of bytes in one complete frame.
    pub fn frame_len(&self) -> usize {
        self.num_samples() * self.sample.bytes()
    }
}

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    layout: SensorLayout,
}

impl FrameDecoder {
    pub fn new(layout: SensorLayout) -> Result<Self> {
        if layout.rows == 0 || layout.cols == 0 {
            return Err(OverlayError::InvalidConfig(format!(
                "sensor layout must be non-empty, got {}x{}",
                layout.rows, layout.cols
            )));
        }
        Ok(FrameDecoder { layout })
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    /// Decode a frame into a grid in camera orientation.
    ///
    /// Bytes past [`SensorLayout::frame_len`] are ignored;
    /// a shorter frame is a [`OverlayError::FrameSizeMismatch`].
    #[instrument(level = "debug", skip_all)]
    pub fn decode(&self, frame: &RawFrame) -> Result<SensorGrid> {
        let expected = self.layout.frame_len();
        if frame.len() < expected {
            return Err(OverlayError::FrameSizeMismatch {
                expected,
                found: frame.len(),
            });
        }

        let count = self.layout.num_samples();
        let mut rdr = ByteOrdered::runtime(
            &frame.as_bytes()[..expected],
            self.layout.byte_order.endianness(),
        );
        let samples = match self.layout.sample {
            SampleWidth::U8 => parse_samples::<u8, _, _>(&mut rdr, count),
            SampleWidth::U16 => parse_samples::<u16, _, _>(&mut rdr, count),
            SampleWidth::U32 => parse_samples::<u32, _, _>(&mut rdr, count),
        }
        .map_err(|_| OverlayError::FrameSizeMismatch {
            expected,
            found: frame.len(),
        })?;

        let (rows, cols) = (self.layout.rows, self.layout.cols);
        let mut grid = Array2::zeros((rows, cols));
        for (row, col) in iproduct!(0..rows, 0..cols) {
            grid[(row, col)] = samples[(rows - 1 - row) * cols + (cols - 1 - col)];
        }
        Ok(grid)
    }
}
