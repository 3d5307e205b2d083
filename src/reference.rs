//! The visible light reference frame.
//!
//! Only its resolution matters to the overlay: it fixes the
//! output size of the registration. The resolution is
//! either configured directly, read from an existing still
//! image, or read from a still captured through an external
//! command (e.g. `raspistill`) at session start.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{ensure, Context, Result};
use serde_derive::*;
use tracing::info;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFrame {
    pub width: u32,
    pub height: u32,
}

impl ReferenceFrame {
    pub fn new(width: u32, height: u32) -> Self {
        ReferenceFrame { width, height }
    }

    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn from_image_path(path: &Path) -> Result<Self> {
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("reading reference image {}", path.display()))?;
        Ok(ReferenceFrame { width, height })
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

const DEFAULT_CAPTURE_PATH: &str = "/tmp/thermal-overlay-reference.jpg";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReferenceConfig {
    pub width: u32,
    pub height: u32,
    /// Still image whose dimensions define the frame.
    pub image: Option<PathBuf>,
    /// Shell command capturing a still into `{path}`, run
    /// before reading the image.
    pub capture: Option<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        ReferenceConfig {
            width: 640,
            height: 480,
            image: None,
            capture: None,
        }
    }
}

impl ReferenceConfig {
    /// Fix the reference frame for a session, capturing a
    /// still first if configured.
    pub fn resolve(&self) -> Result<ReferenceFrame> {
        let frame = match (&self.capture, &self.image) {
            (Some(cmd), image) => {
                let path = image
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CAPTURE_PATH));
                capture_still(cmd, &path)?;
                ReferenceFrame::from_image_path(&path)?
            }
            (None, Some(image)) => ReferenceFrame::from_image_path(image)?,
            (None, None) => ReferenceFrame::new(self.width, self.height),
        };
        ensure!(
            frame.width > 0 && frame.height > 0,
            "reference frame must be non-empty, got {}",
            frame
        );
        info!(%frame, "reference frame");
        Ok(frame)
    }
}

pub fn capture_still(cmd: &str, path: &Path) -> Result<()> {
    let cmd = cmd.replace("{path}", &format!("{}", path.display()));
    info!(%cmd, "capturing reference still");
    ensure!(
        Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .status()
            .context("spawning capture command")?
            .success(),
        "capture command failed: {}",
        cmd
    );
    Ok(())
}
