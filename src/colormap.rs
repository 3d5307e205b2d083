//! False color gradients.

use image::{ImageBuffer, Rgb};
use ndarray::Array2;
use serde_derive::*;
use tracing::instrument;

/// Color image with channels in `[0, 1]`.
pub type ColorGrid = ImageBuffer<Rgb<f32>, Vec<f32>>;

// violet, blue, cyan, green, lime, yellow, orange, red
const SPECTRAL: &[[f32; 3]] = &[
    [0.50, 0.00, 0.60],
    [0.20, 0.10, 0.85],
    [0.00, 0.45, 0.87],
    [0.00, 0.67, 0.60],
    [0.00, 0.75, 0.20],
    [0.55, 0.90, 0.00],
    [0.98, 0.85, 0.00],
    [1.00, 0.45, 0.00],
    [0.85, 0.00, 0.00],
];

const GRAYSCALE: &[[f32; 3]] = &[[0., 0., 0.], [1., 1., 1.]];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Spectral,
    Grayscale,
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::Spectral
    }
}

impl Colormap {
    /// Evenly spaced color stops, coldest first.
    pub fn stops(self) -> &'static [[f32; 3]] {
        match self {
            Colormap::Spectral => SPECTRAL,
            Colormap::Grayscale => GRAYSCALE,
        }
    }

    pub fn coldest(self) -> [f32; 3] {
        self.stops()[0]
    }

    pub fn hottest(self) -> [f32; 3] {
        self.stops()[self.stops().len() - 1]
    }

    /// Color of a normalized intensity. Out of range values
    /// are clamped; `NaN` is treated as `0`.
    pub fn color(self, val: f64) -> [f32; 3] {
        let stops = self.stops();
        let val = if val.is_nan() { 0. } else { val.clamp(0., 1.) };

        let pos = val * (stops.len() - 1) as f64;
        let idx = (pos.floor() as usize).min(stops.len() - 2);
        let frac = (pos - idx as f64) as f32;

        let (a, b) = (stops[idx], stops[idx + 1]);
        [
            a[0] * (1. - frac) + b[0] * frac,
            a[1] * (1. - frac) + b[1] * frac,
            a[2] * (1. - frac) + b[2] * frac,
        ]
    }

    #[instrument(level = "debug", skip_all)]
    pub fn colorize(self, grid: &Array2<f64>) -> ColorGrid {
        let (rows, cols) = grid.dim();
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
            Rgb(self.color(grid[(y as usize, x as usize)]))
        })
    }
}
