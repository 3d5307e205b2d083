//! Display surfaces receiving overlay buffers.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use image::ColorType;
use serde_derive::*;
use tracing::{debug, info};

use crate::{
    error::{OverlayError, Result},
    overlay::{OverlayBuffer, OverlaySettings},
    reference::ReferenceFrame,
};

/// Something that presents overlay buffers on top of the
/// camera preview. Each shown buffer replaces the previous
/// one.
pub trait OverlaySurface: Send {
    fn open(&mut self, reference: ReferenceFrame, settings: OverlaySettings) -> Result<()>;

    fn show(&mut self, buffer: OverlayBuffer) -> Result<()>;

    fn close(&mut self);
}

fn unavailable(path: &Path, what: &str, e: impl std::fmt::Display) -> OverlayError {
    OverlayError::SourceUnavailable(format!("{} {}: {}", what, path.display(), e))
}

/// Rewrites a regular file with the raw RGB bytes of every
/// buffer. Named pipes are refused at `open`: opening one for
/// writing blocks the loop until a reader attaches.
#[derive(Debug)]
pub struct RawFileSurface {
    path: PathBuf,
    open: bool,
}

impl RawFileSurface {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RawFileSurface {
            path: path.as_ref().to_path_buf(),
            open: false,
        }
    }
}

impl OverlaySurface for RawFileSurface {
    fn open(&mut self, reference: ReferenceFrame, settings: OverlaySettings) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if fs::metadata(&self.path).map_or(false, |m| m.file_type().is_fifo()) {
                return Err(unavailable(
                    &self.path,
                    "opening",
                    "named pipes are not supported as raw targets",
                ));
            }
        }
        File::create(&self.path).map_err(|e| unavailable(&self.path, "creating", e))?;
        self.open = true;
        info!(
            path = %self.path.display(),
            %reference,
            layer = settings.layer,
            alpha = settings.alpha,
            "raw overlay surface open"
        );
        Ok(())
    }

    fn show(&mut self, buffer: OverlayBuffer) -> Result<()> {
        if !self.open {
            return Err(unavailable(&self.path, "showing on", "surface is closed"));
        }
        let mut file = File::create(&self.path).map_err(|e| unavailable(&self.path, "opening", e))?;
        file.write_all(buffer.as_bytes())
            .map_err(|e| unavailable(&self.path, "writing", e))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!(path = %self.path.display(), "raw overlay surface closed");
        }
    }
}

/// Saves every buffer as a PNG snapshot. Writes go through
/// a temporary file in the same directory so readers never
/// observe a partial image.
#[derive(Debug)]
pub struct PngSurface {
    path: PathBuf,
    open: bool,
}

impl PngSurface {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        PngSurface {
            path: path.as_ref().to_path_buf(),
            open: false,
        }
    }
}

impl OverlaySurface for PngSurface {
    fn open(&mut self, reference: ReferenceFrame, settings: OverlaySettings) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(unavailable(dir, "missing directory", "not a directory"));
            }
        }
        self.open = true;
        info!(
            path = %self.path.display(),
            %reference,
            layer = settings.layer,
            alpha = settings.alpha,
            "png overlay surface open"
        );
        Ok(())
    }

    fn show(&mut self, buffer: OverlayBuffer) -> Result<()> {
        if !self.open {
            return Err(unavailable(&self.path, "showing on", "surface is closed"));
        }
        let tmp = self.path.with_extension("tmp.png");
        image::save_buffer(
            &tmp,
            buffer.as_bytes(),
            buffer.width(),
            buffer.height(),
            ColorType::Rgb8,
        )
        .map_err(|e| unavailable(&tmp, "writing", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| unavailable(&self.path, "replacing", e))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!(path = %self.path.display(), "png overlay surface closed");
        }
    }
}

/// Where the live session sends its buffers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SurfaceTarget {
    RawFile { path: PathBuf },
    Png { path: PathBuf },
}

impl Default for SurfaceTarget {
    fn default() -> Self {
        SurfaceTarget::RawFile {
            path: PathBuf::from("/tmp/thermal-overlay.rgb"),
        }
    }
}

impl SurfaceTarget {
    pub fn build(&self) -> Box<dyn OverlaySurface> {
        match self {
            SurfaceTarget::RawFile { path } => Box::new(RawFileSurface::new(path)),
            SurfaceTarget::Png { path } => Box::new(PngSurface::new(path)),
        }
    }
}
