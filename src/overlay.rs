//! Encoding of the registered image into the flat RGB
//! buffer consumed by display surfaces.

use image::RgbImage;
use serde_derive::*;
use tracing::instrument;

use crate::colormap::ColorGrid;

/// Row-major, 3 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl OverlayBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = 3 * (y as usize * self.width as usize + x as usize);
        Some([self.bytes[idx], self.bytes[idx + 1], self.bytes[idx + 2]])
    }

    pub fn into_rgb_image(self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.bytes)
    }
}

/// Scale a `[0, 1]` channel to a byte.
#[inline]
pub fn channel_to_byte(val: f32) -> u8 {
    if val.is_nan() {
        return 0;
    }
    (val * 255.).round().clamp(0., 255.) as u8
}

#[instrument(level = "debug", skip_all)]
pub fn encode(image: &ColorGrid) -> OverlayBuffer {
    let (width, height) = image.dimensions();
    OverlayBuffer {
        width,
        height,
        bytes: image.as_raw().iter().copied().map(channel_to_byte).collect(),
    }
}

/// How an overlay is stacked on the preview.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct OverlaySettings {
    pub layer: u32,
    /// Opacity, `0..=255`.
    pub alpha: u8,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        OverlaySettings { layer: 3, alpha: 90 }
    }
}
