//! Affine registration of the sensor grid onto the
//! reference camera frame.
//!
//! The calibration is a rotation, an anisotropic scale and
//! a translation, composed as
//!
//! ```text
//! [ sx cos(r)   -sy sin(r)   tx ]
//! [ sx sin(r)    sy cos(r)   ty ]
//! ```
//!
//! acting on `(x, y) = (column, row)` source coordinates.
//! Warping walks the destination pixels and pulls each one
//! from the source through the inverse map.

use image::Rgb;
use rayon::prelude::*;
use serde_derive::*;
use tracing::instrument;

use crate::{
    colormap::ColorGrid,
    error::{OverlayError, Result},
    reference::ReferenceFrame,
};

/// Slack allowed on the source bounds so that exact edge
/// coordinates survive rounding in the inverse map.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Calibration of one sensor / camera assembly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RegistrationParameters {
    /// Radians. Configuration files may also use a `deg`
    /// or `rad` suffixed string.
    #[serde(deserialize_with = "serde_helpers::angle")]
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Default for RegistrationParameters {
    /// Bench calibration of the reference MLX90621 rig on a
    /// 640x480 preview.
    fn default() -> Self {
        RegistrationParameters {
            rotation: 90f64.to_radians(),
            scale_x: 36.2,
            scale_y: 36.4,
            translate_x: 530.,
            translate_y: 170.,
        }
    }
}

impl RegistrationParameters {
    pub fn identity() -> Self {
        RegistrationParameters {
            rotation: 0.,
            scale_x: 1.,
            scale_y: 1.,
            translate_x: 0.,
            translate_y: 0.,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            self.rotation,
            self.scale_x,
            self.scale_y,
            self.translate_x,
            self.translate_y,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(OverlayError::InvalidCalibration(format!(
                "non-finite calibration value in {:?}",
                self
            )));
        }
        if self.scale_x == 0. || self.scale_y == 0. {
            return Err(OverlayError::InvalidCalibration(format!(
                "degenerate scale ({}, {})",
                self.scale_x, self.scale_y
            )));
        }
        Ok(())
    }
}

/// A 2x3 affine map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    m: [[f64; 3]; 2],
}

impl Affine {
    pub fn from_parameters(params: &RegistrationParameters) -> Self {
        let (sin, cos) = params.rotation.sin_cos();
        let (sx, sy) = (params.scale_x, params.scale_y);
        Affine {
            m: [
                [sx * cos, -sy * sin, params.translate_x],
                [sx * sin, sy * cos, params.translate_y],
            ],
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [r0, r1] = self.m;
        (
            r0[0] * x + r0[1] * y + r0[2],
            r1[0] * x + r1[1] * y + r1[2],
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det == 0. || !det.is_finite() {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Affine {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Bilinear,
    Nearest,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Bilinear
    }
}

/// Warps color grids into the reference frame.
#[derive(Debug, Clone)]
pub struct Registrar {
    inverse: Affine,
    output: ReferenceFrame,
    interpolation: Interpolation,
    fill: [f32; 3],
}

impl Registrar {
    pub fn new(
        params: &RegistrationParameters,
        output: ReferenceFrame,
        interpolation: Interpolation,
        fill: [f32; 3],
    ) -> Result<Self> {
        params.validate()?;
        let inverse = Affine::from_parameters(params)
            .inverse()
            .ok_or_else(|| OverlayError::InvalidCalibration("transform is singular".into()))?;
        Ok(Registrar {
            inverse,
            output,
            interpolation,
            fill,
        })
    }

    pub fn output(&self) -> ReferenceFrame {
        self.output
    }

    /// Source coordinate that lands on destination pixel
    /// `(x, y)`.
    pub fn source_of(&self, x: f64, y: f64) -> (f64, f64) {
        self.inverse.apply(x, y)
    }

    #[instrument(level = "debug", skip_all)]
    pub fn warp(&self, src: &ColorGrid) -> ColorGrid {
        let ReferenceFrame { width, height } = self.output;
        let mut out = ColorGrid::new(width, height);
        if width == 0 || height == 0 {
            return out;
        }

        out.par_chunks_mut(width as usize * 3)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(3).enumerate() {
                    let (sx, sy) = self.inverse.apply(x as f64, y as f64);
                    px.copy_from_slice(&self.sample(src, sx, sy));
                }
            });
        out
    }

    fn sample(&self, src: &ColorGrid, x: f64, y: f64) -> [f32; 3] {
        let (w, h) = src.dimensions();
        if w == 0 || h == 0 {
            return self.fill;
        }
        let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);
        if !(x >= -EDGE_TOLERANCE
            && y >= -EDGE_TOLERANCE
            && x <= max_x + EDGE_TOLERANCE
            && y <= max_y + EDGE_TOLERANCE)
        {
            return self.fill;
        }
        let (x, y) = (x.clamp(0., max_x), y.clamp(0., max_y));

        match self.interpolation {
            Interpolation::Nearest => src.get_pixel(x.round() as u32, y.round() as u32).0,
            Interpolation::Bilinear => {
                let (x0, y0) = (x.floor() as u32, y.floor() as u32);
                let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
                let (fx, fy) = ((x - x0 as f64) as f32, (y - y0 as f64) as f32);

                let lerp = |a: &Rgb<f32>, b: &Rgb<f32>, t: f32| -> [f32; 3] {
                    let (a, b) = (a.0, b.0);
                    [
                        a[0] + t * (b[0] - a[0]),
                        a[1] + t * (b[1] - a[1]),
                        a[2] + t * (b[2] - a[2]),
                    ]
                };
                let top = lerp(src.get_pixel(x0, y0), src.get_pixel(x1, y0), fx);
                let bottom = lerp(src.get_pixel(x0, y1), src.get_pixel(x1, y1), fx);
                lerp(&Rgb(top), &Rgb(bottom), fy)
            }
        }
    }
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(serde_derive::Deserialize)]
    #[serde(untagged)]
    enum AngleRepr {
        Radians(f64),
        Text(String),
    }

    /// An angle as radians, or as a string with an optional
    /// `deg` / `rad` suffix (e.g. `"90deg"`).
    pub fn angle<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*(deg|rad)?\s*$")
                    .unwrap();
        }

        let text = match AngleRepr::deserialize(de)? {
            AngleRepr::Radians(val) => return Ok(val),
            AngleRepr::Text(text) => text,
        };
        let caps = RE
            .captures(&text)
            .ok_or_else(|| Error::custom(format!("unexpected angle format: `{}`", text)))?;
        let val: f64 = caps[1].parse().map_err(Error::custom)?;
        Ok(match caps.get(2).map(|m| m.as_str()) {
            Some("deg") => val.to_radians(),
            _ => val,
        })
    }
}
