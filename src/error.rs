use thiserror::Error;

use crate::session::LoopState;

/// Errors produced by the overlay pipeline and its session
/// loop.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("raw frame size mismatch: expected {expected} bytes, found {found}")]
    FrameSizeMismatch { expected: usize, found: usize },

    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("overlay loop cannot run from state {0:?}")]
    InvalidState(LoopState),
}

impl OverlayError {
    /// Errors raised by a single frame, as opposed to the
    /// source or the session as a whole.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, OverlayError::FrameSizeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;
