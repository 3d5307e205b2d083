//! Sensor byte sources.
//!
//! A [`FrameSource`] hands out one [`RawFrame`] per read.
//! Opens and reads block for as long as the producer takes
//! (opening a named pipe waits for a writer), so the session
//! never touches a source directly: a [`FrameReader`] owns
//! the source on a dedicated thread, opens it on the first
//! request, reads one frame per request and lets the caller
//! wait with a timeout.

use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::{
    channel::{bounded, Receiver, Sender, TrySendError},
    select,
};
use tracing::{debug, warn};

use crate::{
    error::{OverlayError, Result},
    frame::RawFrame,
};

pub trait FrameSource: Send {
    fn open(&mut self) -> Result<()>;

    /// Block until one frame is available.
    fn read_frame(&mut self) -> Result<RawFrame>;

    fn close(&mut self);
}

/// Reads fixed-length frames from a named pipe or file.
///
/// Sensor daemons typically open the pipe, write one frame
/// and close it again. End of stream therefore means "wait
/// for the next writer": the path is reopened, which blocks
/// on a pipe until the daemon comes back. A reopen that
/// produces no data at all means the producer is gone.
#[derive(Debug)]
pub struct PipeSource {
    path: PathBuf,
    frame_len: usize,
    file: Option<File>,
}

impl PipeSource {
    pub fn new<P: AsRef<Path>>(path: P, frame_len: usize) -> Self {
        PipeSource {
            path: path.as_ref().to_path_buf(),
            frame_len,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reopen(&mut self) -> Result<&mut File> {
        let file = File::open(&self.path).map_err(|e| {
            OverlayError::SourceUnavailable(format!("opening {}: {}", self.path.display(), e))
        })?;
        Ok(self.file.insert(file))
    }
}

impl FrameSource for PipeSource {
    fn open(&mut self) -> Result<()> {
        self.reopen()?;
        debug!(path = %self.path.display(), "sensor source open");
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        let mut reopened = false;

        while filled < self.frame_len {
            let file = match self.file.as_mut() {
                Some(file) => file,
                None => {
                    return Err(OverlayError::SourceUnavailable(format!(
                        "{} is not open",
                        self.path.display()
                    )))
                }
            };
            match file.read(&mut buf[filled..]) {
                Ok(0) if filled > 0 => break,
                Ok(0) if reopened => {
                    return Err(OverlayError::SourceUnavailable(format!(
                        "{} closed without data",
                        self.path.display()
                    )))
                }
                Ok(0) => {
                    self.reopen()?;
                    reopened = true;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(OverlayError::SourceUnavailable(format!(
                        "reading {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
        }

        buf.truncate(filled);
        Ok(RawFrame::new(buf))
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "sensor source closed");
        }
    }
}

/// Closes the wrapped source when dropped, including when
/// the reader thread never got to run.
struct ClosingSource(Box<dyn FrameSource>);

impl Drop for ClosingSource {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Outcome of waiting for a frame.
#[derive(Debug)]
pub enum FramePoll {
    Frame(Result<RawFrame>),
    TimedOut,
    Stopped,
    /// The reader thread is gone.
    Disconnected,
}

/// Owns a [`FrameSource`] on a worker thread.
///
/// At most one read is outstanding at a time. A read that
/// outlives a poll timeout stays outstanding, and its frame
/// is handed out by the next poll.
pub struct FrameReader {
    requests: Option<Sender<()>>,
    frames: Receiver<Result<RawFrame>>,
    handle: Option<JoinHandle<()>>,
    pending: bool,
}

impl FrameReader {
    /// Spawn the worker over an unopened source. The first
    /// request opens it, so a failed open is reported by the
    /// first poll and a stalled one is subject to the poll
    /// timeout. The worker closes the source when it exits.
    pub fn spawn(source: Box<dyn FrameSource>) -> Result<Self> {
        let (req_tx, req_rx) = bounded::<()>(1);
        let (frame_tx, frame_rx) = bounded(1);

        let source = ClosingSource(source);
        let handle = thread::Builder::new()
            .name("frame-reader".into())
            .spawn(move || {
                let mut source = source;
                let mut opened = false;
                while req_rx.recv().is_ok() {
                    if !opened {
                        if let Err(e) = source.0.open() {
                            if frame_tx.send(Err(e)).is_err() {
                                break;
                            }
                            continue;
                        }
                        opened = true;
                    }
                    if frame_tx.send(source.0.read_frame()).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| OverlayError::SourceUnavailable(format!("spawning reader: {}", e)))?;

        Ok(FrameReader {
            requests: Some(req_tx),
            frames: frame_rx,
            handle: Some(handle),
            pending: false,
        })
    }

    /// Wait up to `timeout` for the next frame, returning
    /// early if `stop` fires.
    pub fn poll(&mut self, timeout: Duration, stop: &Receiver<()>) -> FramePoll {
        if !self.pending {
            let requests = match &self.requests {
                Some(requests) => requests,
                None => return FramePoll::Disconnected,
            };
            match requests.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => self.pending = true,
                Err(TrySendError::Disconnected(())) => return FramePoll::Disconnected,
            }
        }

        select! {
            recv(self.frames) -> msg => match msg {
                Ok(frame) => {
                    self.pending = false;
                    FramePoll::Frame(frame)
                }
                Err(_) => FramePoll::Disconnected,
            },
            recv(stop) -> _ => FramePoll::Stopped,
            default(timeout) => FramePoll::TimedOut,
        }
    }

    /// Stop the worker, waiting up to `grace` for it to
    /// close the source. Returns `false` if the worker is
    /// still blocked in a read and had to be detached.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        self.requests.take();
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return true,
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if !handle.is_finished() {
            warn!("frame reader still blocked in a read, detaching");
            return false;
        }
        if handle.join().is_err() {
            warn!("frame reader panicked");
        }
        true
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}
