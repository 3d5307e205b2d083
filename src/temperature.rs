//! Conversion of daemon samples to temperatures.
//!
//! The MLX90621 daemon computes object temperatures on the
//! device and writes them as unsigned tenths of a kelvin:
//! `raw = (celsius + 273.15) * 10`, truncated. The overlay
//! itself works on the raw samples (the contrast stretch is
//! scale invariant); temperatures are only used for
//! diagnostics and the `thermal-frame` tool.

use serde_derive::*;

use crate::{frame::SensorGrid, stats::PixelStats};

const CELICIUS_OFFSET: f64 = 273.15;
const DECI_KELVIN_PER_KELVIN: f64 = 10.;

pub fn raw_to_celsius(raw: f64) -> f64 {
    raw / DECI_KELVIN_PER_KELVIN - CELICIUS_OFFSET
}

pub fn celsius_to_raw(temp: f64) -> f64 {
    (temp + CELICIUS_OFFSET) * DECI_KELVIN_PER_KELVIN
}

/// Temperature summary of one decoded frame, in celsius.
#[derive(Serialize, Debug, Clone, Copy)]
pub struct FrameTemperatures {
    pub stats: PixelStats,
    pub hottest: (usize, usize),
}

impl FrameTemperatures {
    pub fn from_grid(grid: &SensorGrid) -> Self {
        let mut stats = PixelStats::default();
        let mut hottest = (0, 0);
        let mut hottest_temp = f64::NEG_INFINITY;
        for ((row, col), &raw) in grid.indexed_iter() {
            let temp = raw_to_celsius(raw);
            stats += temp;
            if temp > hottest_temp {
                hottest_temp = temp;
                hottest = (row, col);
            }
        }
        FrameTemperatures { stats, hottest }
    }
}
