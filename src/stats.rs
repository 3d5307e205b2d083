//! Summary statistics over decoded sensor values.

use std::ops::AddAssign;

use serde_derive::*;

/// Running min / max / mean over a stream of values.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PixelStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    sum: f64,
}

impl Default for PixelStats {
    fn default() -> Self {
        PixelStats {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.,
        }
    }
}

impl PixelStats {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl AddAssign<f64> for PixelStats {
    fn add_assign(&mut self, val: f64) {
        self.count += 1;
        self.sum += val;
        self.min = self.min.min(val);
        self.max = self.max.max(val);
    }
}

impl<'a> FromIterator<&'a f64> for PixelStats {
    fn from_iter<I: IntoIterator<Item = &'a f64>>(iter: I) -> Self {
        let mut stats = PixelStats::default();
        for &val in iter {
            stats += val;
        }
        stats
    }
}
