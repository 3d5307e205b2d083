//! Per-frame percentile contrast stretch.

use ndarray::Array2;
use serde_derive::*;
use tracing::{instrument, trace};

use crate::{
    error::{OverlayError, Result},
    frame::SensorGrid,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ContrastSettings {
    pub low_percentile: f64,
    pub high_percentile: f64,
}

impl Default for ContrastSettings {
    fn default() -> Self {
        ContrastSettings {
            low_percentile: 2.,
            high_percentile: 98.,
        }
    }
}

/// Maps the low percentile of a frame to `0.0` and the high
/// percentile to `1.0`, clamping everything else.
///
/// Percentiles are taken fresh for every frame, so the
/// displayed range follows the scene. When both
/// percentiles coincide (a single outlier on a flat
/// background), the frame's full min/max range is used
/// instead; a constant frame stretches to all zeros.
#[derive(Debug, Clone)]
pub struct ContrastStretch {
    settings: ContrastSettings,
}

impl ContrastStretch {
    pub fn new(settings: ContrastSettings) -> Result<Self> {
        let ContrastSettings {
            low_percentile: lo,
            high_percentile: hi,
        } = settings;
        if !(0. ..=100.).contains(&lo) || !(0. ..=100.).contains(&hi) || lo >= hi {
            return Err(OverlayError::InvalidConfig(format!(
                "percentile bounds must satisfy 0 <= low < high <= 100, got ({}, {})",
                lo, hi
            )));
        }
        Ok(ContrastStretch { settings })
    }

    #[instrument(level = "debug", skip_all)]
    pub fn normalize(&self, grid: &SensorGrid) -> Array2<f64> {
        let mut sorted: Vec<f64> = grid.iter().copied().filter(|v| !v.is_nan()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let (mut lo, mut hi) = (
            percentile(&sorted, self.settings.low_percentile),
            percentile(&sorted, self.settings.high_percentile),
        );
        if lo == hi {
            if let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) {
                lo = min;
                hi = max;
            }
        }
        trace!(lo, hi, "contrast range");

        if !(hi > lo) {
            return Array2::zeros(grid.dim());
        }
        let span = hi - lo;
        grid.mapv(|v| ((v - lo) / span).clamp(0., 1.))
    }
}

/// Percentile of sorted values, linearly interpolated
/// between the closest ranks. `NaN` for an empty slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (pct / 100.).clamp(0., 1.) * (n - 1) as f64;
            let below = pos.floor() as usize;
            let above = (below + 1).min(n - 1);
            let frac = pos - below as f64;
            sorted[below] + frac * (sorted[above] - sorted[below])
        }
    }
}
