//! The live overlay loop.
//!
//! [`OverlayLoop`] moves through `Idle -> Running ->
//! Stopped`. Entering `Running` opens the display surface
//! and hands the sensor source to a [`FrameReader`], which
//! opens it with the first read; every exit from `Running`,
//! whether by stop request or by error, releases both.

use std::time::{Duration, Instant};

use crossbeam::{
    channel::{bounded, Receiver, Sender},
    select,
};
use serde_derive::*;
use tracing::{debug, error, info, warn};

use crate::{
    error::{OverlayError, Result},
    overlay::OverlaySettings,
    pipeline::OverlayPipeline,
    source::{FramePoll, FrameReader, FrameSource},
    surface::OverlaySurface,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// What to do with a frame that fails to decode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FramePolicy {
    /// End the session.
    FailFast,
    /// Log it and wait for the next tick.
    SkipFrame,
}

impl Default for FramePolicy {
    fn default() -> Self {
        FramePolicy::FailFast
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub tick: Duration,
    pub read_timeout: Duration,
    /// Consecutive read timeouts tolerated before the
    /// source is declared unavailable.
    pub max_read_retries: u32,
    pub frame_policy: FramePolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        LoopSettings {
            tick: Duration::from_millis(250),
            read_timeout: Duration::from_millis(1000),
            max_read_retries: 3,
            frame_policy: FramePolicy::FailFast,
        }
    }
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_shown: usize,
    pub frames_skipped: usize,
    pub read_timeouts: usize,
}

/// Requests the loop to stop at its next tick boundary.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // a full channel already carries a stop request
        let _ = self.tx.try_send(());
    }
}

pub struct OverlayLoop {
    pipeline: OverlayPipeline,
    settings: LoopSettings,
    overlay: OverlaySettings,
    source: Option<Box<dyn FrameSource>>,
    surface: Box<dyn OverlaySurface>,
    state: LoopState,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl OverlayLoop {
    pub fn new(
        pipeline: OverlayPipeline,
        settings: LoopSettings,
        overlay: OverlaySettings,
        source: Box<dyn FrameSource>,
        surface: Box<dyn OverlaySurface>,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        OverlayLoop {
            pipeline,
            settings,
            overlay,
            source: Some(source),
            surface,
            state: LoopState::Idle,
            stop_tx,
            stop_rx,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Run the session until stopped or until a terminal
    /// error.
    pub fn run(&mut self) -> Result<SessionSummary> {
        let source = match (self.state, self.source.take()) {
            (LoopState::Idle, Some(source)) => source,
            (state, _) => return Err(OverlayError::InvalidState(state)),
        };

        self.state = LoopState::Running;
        info!(
            tick_ms = self.settings.tick.as_millis() as u64,
            policy = ?self.settings.frame_policy,
            "overlay loop running"
        );
        let result = self.run_with(source);
        self.state = LoopState::Stopped;

        match &result {
            Ok(summary) => info!(?summary, "overlay loop stopped"),
            Err(e) => error!(error = %e, "overlay loop failed"),
        }
        result
    }

    fn run_with(&mut self, source: Box<dyn FrameSource>) -> Result<SessionSummary> {
        let reference = self.pipeline.registrar().output();
        self.surface.open(reference, self.overlay)?;
        // the source is opened by the reader, under the read
        // timeout and the stop channel
        let mut reader = match FrameReader::spawn(source) {
            Ok(reader) => reader,
            Err(e) => {
                self.surface.close();
                return Err(e);
            }
        };

        let result = self.tick_loop(&mut reader);

        if !reader.shutdown(self.settings.read_timeout) {
            warn!("sensor source will close once its pending read returns");
        }
        self.surface.close();
        result
    }

    fn tick_loop(&mut self, reader: &mut FrameReader) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        let mut next_tick = Instant::now();

        loop {
            if self.stop_rx.try_recv().is_ok() {
                debug!("stop requested");
                return Ok(summary);
            }

            let mut timeouts = 0;
            let frame = loop {
                match reader.poll(self.settings.read_timeout, &self.stop_rx) {
                    FramePoll::Frame(frame) => break frame,
                    FramePoll::Stopped => {
                        debug!("stop requested while waiting for a frame");
                        return Ok(summary);
                    }
                    FramePoll::Disconnected => {
                        return Err(OverlayError::SourceUnavailable(
                            "frame reader exited".into(),
                        ))
                    }
                    FramePoll::TimedOut => {
                        summary.read_timeouts += 1;
                        timeouts += 1;
                        if timeouts > self.settings.max_read_retries {
                            return Err(OverlayError::SourceUnavailable(format!(
                                "no frame after {} reads of {:?}",
                                timeouts, self.settings.read_timeout
                            )));
                        }
                        warn!(timeouts, "sensor read timed out, retrying");
                    }
                }
            };

            match frame.and_then(|frame| self.pipeline.process(&frame)) {
                Ok(buffer) => {
                    self.surface.show(buffer)?;
                    summary.frames_shown += 1;
                    debug!(frame = summary.frames_shown, "overlay updated");
                }
                Err(e)
                    if e.is_frame_error() && self.settings.frame_policy == FramePolicy::SkipFrame =>
                {
                    summary.frames_skipped += 1;
                    warn!(error = %e, "skipping frame");
                }
                Err(e) => return Err(e),
            }

            next_tick += self.settings.tick;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
            select! {
                recv(self.stop_rx) -> _ => {
                    debug!("stop requested");
                    return Ok(summary);
                }
                default(next_tick - now) => {}
            }
        }
    }
}

impl Drop for OverlayLoop {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{ByteOrder, RawFrame, SensorLayout},
        pipeline::PipelineSettings,
        reference::ReferenceFrame,
        registration::RegistrationParameters,
        overlay::OverlayBuffer,
        source::PipeSource,
    };
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    #[derive(Debug, Default)]
    struct Calls {
        source_open: bool,
        source_closed: bool,
        surface_open: bool,
        surface_closed: bool,
        reads: usize,
        shown: usize,
    }

    type SharedCalls = Arc<Mutex<Calls>>;

    struct MockSource {
        calls: SharedCalls,
        /// Played in order; the last frame repeats.
        script: Vec<RawFrame>,
        delay: Duration,
        fail_open: bool,
    }

    impl FrameSource for MockSource {
        fn open(&mut self) -> Result<()> {
            if self.fail_open {
                return Err(OverlayError::SourceUnavailable("no daemon".into()));
            }
            self.calls.lock().unwrap().source_open = true;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<RawFrame> {
            thread::sleep(self.delay);
            let mut calls = self.calls.lock().unwrap();
            let idx = calls.reads.min(self.script.len() - 1);
            calls.reads += 1;
            Ok(self.script[idx].clone())
        }

        fn close(&mut self) {
            self.calls.lock().unwrap().source_closed = true;
        }
    }

    struct MockSurface {
        calls: SharedCalls,
        stop_after: Option<(usize, StopHandle)>,
        fail_open: bool,
    }

    impl OverlaySurface for MockSurface {
        fn open(&mut self, reference: ReferenceFrame, _settings: OverlaySettings) -> Result<()> {
            if self.fail_open {
                return Err(OverlayError::SourceUnavailable("no display".into()));
            }
            assert_eq!(reference, ReferenceFrame::new(4, 16));
            self.calls.lock().unwrap().surface_open = true;
            Ok(())
        }

        fn show(&mut self, buffer: OverlayBuffer) -> Result<()> {
            assert_eq!(buffer.as_bytes().len(), 4 * 16 * 3);
            let mut calls = self.calls.lock().unwrap();
            calls.shown += 1;
            if let Some((after, stop)) = &self.stop_after {
                if calls.shown >= *after {
                    stop.stop();
                }
            }
            Ok(())
        }

        fn close(&mut self) {
            self.calls.lock().unwrap().surface_closed = true;
        }
    }

    fn good_frame() -> RawFrame {
        RawFrame::new(vec![0; 128])
    }

    fn pipeline() -> OverlayPipeline {
        let settings = PipelineSettings {
            layout: SensorLayout {
                byte_order: ByteOrder::Little,
                ..SensorLayout::default()
            },
            registration: RegistrationParameters::identity(),
            ..PipelineSettings::default()
        };
        OverlayPipeline::new(&settings, ReferenceFrame::new(4, 16)).unwrap()
    }

    fn fast_settings() -> LoopSettings {
        LoopSettings {
            tick: Duration::from_millis(5),
            read_timeout: Duration::from_secs(2),
            ..LoopSettings::default()
        }
    }

    fn session(
        calls: &SharedCalls,
        script: Vec<RawFrame>,
        settings: LoopSettings,
    ) -> OverlayLoop {
        OverlayLoop::new(
            pipeline(),
            settings,
            OverlaySettings::default(),
            Box::new(MockSource {
                calls: calls.clone(),
                script,
                delay: Duration::ZERO,
                fail_open: false,
            }),
            Box::new(MockSurface {
                calls: calls.clone(),
                stop_after: None,
                fail_open: false,
            }),
        )
    }

    fn stopping_session(
        calls: &SharedCalls,
        script: Vec<RawFrame>,
        settings: LoopSettings,
        stop_after: usize,
    ) -> OverlayLoop {
        let mut session = session(calls, script, settings);
        let surface = MockSurface {
            calls: calls.clone(),
            stop_after: Some((stop_after, session.stop_handle())),
            fail_open: false,
        };
        session.surface = Box::new(surface);
        session
    }

    fn assert_released(calls: &SharedCalls) {
        let calls = calls.lock().unwrap();
        assert!(calls.source_closed, "sensor source left open");
        assert!(calls.surface_closed, "surface left open");
    }

    #[test]
    fn stop_before_first_tick() -> Result<()> {
        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], fast_settings());
        session.stop_handle().stop();

        let summary = session.run()?;
        assert_eq!(summary.frames_shown, 0);
        assert_eq!(session.state(), LoopState::Stopped);
        assert_eq!(calls.lock().unwrap().shown, 0);
        assert_released(&calls);
        Ok(())
    }

    #[test]
    fn stops_at_tick_boundary() -> Result<()> {
        let calls = SharedCalls::default();
        let mut session = stopping_session(&calls, vec![good_frame()], fast_settings(), 3);

        let summary = session.run()?;
        assert_eq!(summary.frames_shown, 3);
        assert_eq!(calls.lock().unwrap().shown, 3);
        assert_released(&calls);
        Ok(())
    }

    #[test]
    fn stop_from_another_thread() -> Result<()> {
        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], fast_settings());
        let stop = session.stop_handle();

        let runner = thread::spawn(move || session.run());
        thread::sleep(Duration::from_millis(50));
        let requested = Instant::now();
        stop.stop();
        let summary = runner.join().unwrap()?;

        assert!(requested.elapsed() < Duration::from_secs(1));
        assert!(summary.frames_shown > 0);
        assert_released(&calls);

        let shown = calls.lock().unwrap().shown;
        assert_eq!(shown, summary.frames_shown);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.lock().unwrap().shown, shown);
        Ok(())
    }

    #[test]
    fn fail_fast_on_short_frame() {
        let calls = SharedCalls::default();
        let mut session = session(
            &calls,
            vec![good_frame(), RawFrame::new(vec![0; 60])],
            fast_settings(),
        );

        match session.run() {
            Err(OverlayError::FrameSizeMismatch { expected, found }) => {
                assert_eq!((expected, found), (128, 60));
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
        assert_eq!(calls.lock().unwrap().shown, 1);
        assert_eq!(session.state(), LoopState::Stopped);
        assert_released(&calls);
    }

    #[test]
    fn skip_frame_policy_keeps_going() -> Result<()> {
        let calls = SharedCalls::default();
        let settings = LoopSettings {
            frame_policy: FramePolicy::SkipFrame,
            ..fast_settings()
        };
        let mut session = stopping_session(
            &calls,
            vec![RawFrame::new(vec![0; 10]), good_frame()],
            settings,
            2,
        );

        let summary = session.run()?;
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(summary.frames_shown, 2);
        assert_released(&calls);
        Ok(())
    }

    #[test]
    fn stalled_source_becomes_unavailable() {
        let calls = SharedCalls::default();
        let settings = LoopSettings {
            read_timeout: Duration::from_millis(10),
            max_read_retries: 2,
            ..fast_settings()
        };
        let mut session = OverlayLoop::new(
            pipeline(),
            settings,
            OverlaySettings::default(),
            Box::new(MockSource {
                calls: calls.clone(),
                script: vec![good_frame()],
                delay: Duration::from_millis(500),
                fail_open: false,
            }),
            Box::new(MockSurface {
                calls: calls.clone(),
                stop_after: None,
                fail_open: false,
            }),
        );

        assert!(matches!(
            session.run(),
            Err(OverlayError::SourceUnavailable(_))
        ));
        assert!(calls.lock().unwrap().surface_closed);
    }

    #[test]
    fn source_open_failure_is_surfaced() {
        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], fast_settings());
        session.source = Some(Box::new(MockSource {
            calls: calls.clone(),
            script: vec![good_frame()],
            delay: Duration::ZERO,
            fail_open: true,
        }));

        assert!(matches!(
            session.run(),
            Err(OverlayError::SourceUnavailable(_))
        ));
        assert_eq!(session.state(), LoopState::Stopped);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.reads, 0);
        assert_eq!(calls.shown, 0);
        assert!(calls.surface_closed);
    }

    #[test]
    fn surface_open_failure_releases_source() {
        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], fast_settings());
        session.surface = Box::new(MockSurface {
            calls: calls.clone(),
            stop_after: None,
            fail_open: true,
        });

        assert!(matches!(
            session.run(),
            Err(OverlayError::SourceUnavailable(_))
        ));
        let calls = calls.lock().unwrap();
        assert!(!calls.source_open);
        assert_eq!(calls.reads, 0);
    }

    /// Runs the session on a named pipe nobody writes to,
    /// failing the test instead of hanging if `run` blocks.
    #[cfg(unix)]
    fn run_on_writerless_pipe(
        settings: LoopSettings,
        stop_first: bool,
    ) -> anyhow::Result<(Result<SessionSummary>, Duration, SharedCalls)> {
        let dir = tempfile::tempdir()?;
        let fifo = dir.path().join("sensor.fifo");
        anyhow::ensure!(
            std::process::Command::new("mkfifo").arg(&fifo).status()?.success(),
            "mkfifo failed"
        );

        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], settings);
        session.source = Some(Box::new(PipeSource::new(&fifo, 128)));
        if stop_first {
            session.stop_handle().stop();
        }

        let (done_tx, done_rx) = bounded(1);
        let started = Instant::now();
        thread::spawn(move || {
            let _ = done_tx.send(session.run());
        });
        let result = done_rx
            .recv_timeout(Duration::from_secs(3))
            .map_err(|_| anyhow::anyhow!("run() still blocked on a writerless pipe"))?;
        Ok((result, started.elapsed(), calls))
    }

    #[test]
    #[cfg(unix)]
    fn stop_is_honored_while_pipe_has_no_writer() -> anyhow::Result<()> {
        let settings = LoopSettings {
            read_timeout: Duration::from_millis(50),
            max_read_retries: 1,
            ..fast_settings()
        };
        let (result, elapsed, calls) = run_on_writerless_pipe(settings, true)?;

        assert_eq!(result?, SessionSummary::default());
        assert!(elapsed < Duration::from_secs(1));
        assert!(calls.lock().unwrap().surface_closed);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn writerless_pipe_becomes_unavailable() -> anyhow::Result<()> {
        let settings = LoopSettings {
            read_timeout: Duration::from_millis(50),
            max_read_retries: 1,
            ..fast_settings()
        };
        let (result, elapsed, calls) = run_on_writerless_pipe(settings, false)?;

        assert!(matches!(result, Err(OverlayError::SourceUnavailable(_))));
        assert!(elapsed < Duration::from_secs(1));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.shown, 0);
        assert!(calls.surface_closed);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn stop_from_another_thread_while_pipe_has_no_writer() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fifo = dir.path().join("sensor.fifo");
        anyhow::ensure!(
            std::process::Command::new("mkfifo").arg(&fifo).status()?.success(),
            "mkfifo failed"
        );

        let calls = SharedCalls::default();
        let settings = LoopSettings {
            read_timeout: Duration::from_millis(100),
            max_read_retries: 1000,
            ..fast_settings()
        };
        let mut session = session(&calls, vec![good_frame()], settings);
        session.source = Some(Box::new(PipeSource::new(&fifo, 128)));
        let stop = session.stop_handle();

        let (done_tx, done_rx) = bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(session.run());
        });
        thread::sleep(Duration::from_millis(150));
        stop.stop();

        let summary = done_rx
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| anyhow::anyhow!("stop not honored while opening the pipe"))??;
        assert_eq!(summary.frames_shown, 0);
        assert!(calls.lock().unwrap().surface_closed);
        Ok(())
    }

    #[test]
    fn runs_only_once() -> Result<()> {
        let calls = SharedCalls::default();
        let mut session = session(&calls, vec![good_frame()], fast_settings());
        session.stop_handle().stop();
        session.run()?;

        assert!(matches!(
            session.run(),
            Err(OverlayError::InvalidState(LoopState::Stopped))
        ));
        Ok(())
    }
}
