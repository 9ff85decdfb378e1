//! Session lifecycle: binds a video source, an input source and a packet
//! sink into one run.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──► Starting ──ok──► Active ──stop──► Stopping ──► Idle
//!                    │
//!                    └──input unavailable──► Idle
//! ```
//!
//! The state lives in one atomic and every transition is a compare-and-swap,
//! so two concurrent `stop()` calls (say, the operator's menu and a
//! middle-button press on the dispatch thread) tear down exactly once.
//! A caller that loses the race waits on a condition variable until the
//! winner has reached `Idle`.  A `stop()` that arrives while the session is
//! still `Starting` is recorded and honoured before `Active` is published.
//!
//! # Threads
//!
//! A running session owns a video pump thread, the input source's own thread
//! (cursor poll or OS hook), a transport writer thread and one dispatch
//! thread.  The dispatch thread is the single consumer of the input channel
//! and owns both the [`InputNormalizer`] and the [`InputTranslator`]; no
//! other thread touches modifier or button state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidkvm_core::protocol::encode_media_key;
use hidkvm_core::{MediaKey, Size};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::application::normalize_input::InputNormalizer;
use crate::application::session_config::SessionConfig;
use crate::application::translate_input::{InputTranslator, Outcome};
use crate::infrastructure::input_capture::surface::CaptureSurface;
use crate::infrastructure::input_capture::{CaptureError, CaptureMode, InputSource, RawInputEvent};
use crate::infrastructure::transport::null::NullSink;
use crate::infrastructure::transport::{PacketSink, SerialEndpoint, TransportError, TransportStats};
use crate::infrastructure::video::pump::{FrameSlot, VideoPump};
use crate::infrastructure::video::{VideoError, VideoFormat, VideoFrame, VideoInfo, VideoSource};

/// How long the dispatch thread waits for an event before re-checking
/// whether it should exit.
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Starting = 1,
    Active = 2,
    Stopping = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Active,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs a different state.
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Neither the requested input source nor the window fallback started.
    #[error("no input source could be started: {0}")]
    InputUnavailable(#[source] CaptureError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("failed to start dispatch thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Factory for the OS-facing parts of a session.
///
/// The production implementation opens real ports and hooks; tests supply
/// recording sinks and mock sources.
pub trait SessionBackend: Send + Sync {
    /// Opens the serial transport.
    fn connect(&self, endpoint: &SerialEndpoint) -> Result<Arc<dyn PacketSink>, TransportError>;

    /// Creates an input source for `mode`.
    fn input_source(&self, mode: CaptureMode) -> Result<Box<dyn InputSource>, CaptureError>;

    /// The widget the video is shown in.
    fn surface(&self) -> Arc<dyn CaptureSurface>;

    /// The frame producer.
    fn video_source(&self) -> Arc<dyn VideoSource>;
}

/// Resources held by a running session.
struct ActiveSession {
    id: Uuid,
    span: Span,
    config: SessionConfig,
    sink: Arc<dyn PacketSink>,
    video: Arc<dyn VideoSource>,
    pump: Option<VideoPump>,
    actual_size: Size,
    input: Box<dyn InputSource>,
    mode: CaptureMode,
    dispatch_running: Arc<AtomicBool>,
    dispatch: Option<JoinHandle<()>>,
}

struct Shared {
    backend: Arc<dyn SessionBackend>,
    state: AtomicU8,
    session: Mutex<Option<ActiveSession>>,
    frames: Arc<FrameSlot>,
    /// Remote screen size the dispatch thread maps pointer events into.
    remote_size: Mutex<Size>,
    /// Held while publishing `Active` or `Idle`; `settled` is signalled after.
    lifecycle: Mutex<()>,
    settled: Condvar,
    stop_requested: AtomicBool,
}

/// Owner of the session lifecycle.
///
/// Cheap to clone; clones control the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                state: AtomicU8::new(SessionState::Idle as u8),
                session: Mutex::new(None),
                frames: Arc::new(FrameSlot::new()),
                remote_size: Mutex::new(Size::default()),
                lifecycle: Mutex::new(()),
                settled: Condvar::new(),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Starts a session with `config`.
    ///
    /// A transport that cannot be opened and a video source that refuses to
    /// start are not errors: the session runs with a null sink or without
    /// video.  Only the input side is mandatory.
    ///
    /// A `stop()` that arrives meanwhile is honoured before the session goes
    /// active; the id is still returned and the controller ends up idle.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] unless the controller is idle.
    /// - [`SessionError::InputUnavailable`] if no input source started.
    /// - [`SessionError::ThreadSpawn`] if the dispatch thread failed.
    pub fn start(&self, config: SessionConfig) -> Result<Uuid, SessionError> {
        self.shared.transition(SessionState::Idle, SessionState::Starting)?;

        match self.shared.acquire(config) {
            Ok(id) => {
                self.shared.publish_active();
                Ok(id)
            }
            Err(e) => {
                self.shared.settle_idle();
                Err(e)
            }
        }
    }

    /// Stops the running session.  Idempotent and callable from any thread;
    /// returns once the controller is [`SessionState::Idle`].
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Restarts capture with a new format while the session keeps running.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless active; [`SessionError::Video`]
    /// if the pump thread cannot be restarted.
    pub fn restart_video(&self, format: VideoFormat) -> Result<(), SessionError> {
        self.shared.require(SessionState::Active)?;

        let mut guard = self.shared.session.lock();
        let Some(session) = guard.as_mut() else {
            return Err(SessionError::InvalidState {
                expected: SessionState::Active,
                actual: self.state(),
            });
        };
        let _enter = session.span.clone().entered();

        if let Some(mut pump) = session.pump.take() {
            pump.stop();
        }
        session.video.stop();
        self.shared.frames.clear();

        session.config = session.config.with_video(format);
        let (pump, actual) =
            start_video(&session.video, &session.config.video, &self.shared.frames)?;
        session.pump = pump;
        session.actual_size = actual;
        *self.shared.remote_size.lock() = actual;

        info!(format = %format, "video restarted");
        Ok(())
    }

    /// Requested format, actual size and measured rate of the video feed.
    pub fn video_info(&self) -> Option<VideoInfo> {
        let guard = self.shared.session.lock();
        let session = guard.as_ref()?;
        Some(VideoInfo {
            requested: session.config.video,
            actual: session.actual_size,
            measured_fps: session.pump.as_ref().map_or(0.0, VideoPump::measured_fps),
        })
    }

    /// Most recent frame, if any.
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.shared.frames.latest()
    }

    /// Taps a media key on the remote machine.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless active.
    pub fn send_media_key(&self, key: MediaKey) -> Result<(), SessionError> {
        self.shared.require(SessionState::Active)?;
        let sink = self.shared.session.lock().as_ref().map(|s| Arc::clone(&s.sink));
        if let Some(sink) = sink {
            debug!(?key, "media key");
            sink.submit_sequence(encode_media_key(key));
        }
        Ok(())
    }

    /// Capture mode in effect after any fallback.
    pub fn active_mode(&self) -> Option<CaptureMode> {
        self.shared.session.lock().as_ref().map(|s| s.mode)
    }

    pub fn transport_stats(&self) -> Option<TransportStats> {
        self.shared.session.lock().as_ref().map(|s| s.sink.stats())
    }

    /// Label of the sink in use, e.g. the serial endpoint or "null".
    pub fn transport_description(&self) -> Option<String> {
        self.shared.session.lock().as_ref().map(|s| s.sink.describe())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.session.lock().as_ref().map(|s| s.id)
    }
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| SessionError::InvalidState {
                expected: from,
                actual: SessionState::from_u8(actual),
            })
    }

    fn require(&self, expected: SessionState) -> Result<(), SessionError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState { expected, actual })
        }
    }

    fn acquire(self: &Arc<Self>, config: SessionConfig) -> Result<Uuid, SessionError> {
        let id = Uuid::new_v4();
        let span = info_span!("session", %id);
        let _enter = span.clone().entered();
        info!(video = %config.video, capture = %config.capture_mode, "starting session");

        let sink = self.open_sink(&config);

        let video = self.backend.video_source();
        let (pump, actual_size) = match start_video(&video, &config.video, &self.frames) {
            Ok(started) => started,
            Err(e) => {
                warn!("video pump unavailable, continuing without video: {e}");
                video.stop();
                (None, config.video.size())
            }
        };
        *self.remote_size.lock() = actual_size;

        let (mut input, events) = match self.open_input(config.capture_mode) {
            Ok(opened) => opened,
            Err(e) => {
                drop(pump);
                video.stop();
                sink.close();
                warn!("session start aborted: {e}");
                return Err(SessionError::InputUnavailable(e));
            }
        };
        let mode = input.mode();

        let surface = self.backend.surface();
        let normalizer = InputNormalizer::new(
            input.keymap(),
            Arc::clone(&surface),
            input.coordinate_space(),
        );
        let translator = InputTranslator::new(input.keymap(), config.pointer_mode, actual_size);

        let dispatch_running = Arc::new(AtomicBool::new(true));
        let spawned = {
            let shared = Arc::clone(self);
            let sink = Arc::clone(&sink);
            let running = Arc::clone(&dispatch_running);
            let span = span.clone();
            thread::Builder::new()
                .name("hidkvm-dispatch".to_string())
                .spawn(move || {
                    let _enter = span.entered();
                    let worker = Dispatcher {
                        shared,
                        surface,
                        sink,
                        normalizer,
                        translator,
                    };
                    worker.run(events, &running);
                })
        };
        let dispatch_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                input.stop();
                drop(pump);
                video.stop();
                sink.close();
                return Err(SessionError::ThreadSpawn(e));
            }
        };

        info!(mode = %mode, transport = %sink.describe(), "session active");
        *self.session.lock() = Some(ActiveSession {
            id,
            span: span.clone(),
            config,
            sink,
            video,
            pump,
            actual_size,
            input,
            mode,
            dispatch_running,
            dispatch: Some(dispatch_handle),
        });
        Ok(id)
    }

    fn open_sink(&self, config: &SessionConfig) -> Arc<dyn PacketSink> {
        let Some(endpoint) = config.serial_target() else {
            info!(test_mode = config.test_mode, "no serial endpoint, packets are discarded");
            return Arc::new(NullSink::new());
        };
        match self.backend.connect(endpoint) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("{e}; falling back to null sink");
                Arc::new(NullSink::new())
            }
        }
    }

    fn open_input(
        &self,
        mode: CaptureMode,
    ) -> Result<(Box<dyn InputSource>, Receiver<RawInputEvent>), CaptureError> {
        match self.start_input(mode) {
            Ok(opened) => Ok(opened),
            Err(e) if mode == CaptureMode::Global => {
                warn!("global capture unavailable ({e}), falling back to window capture");
                self.start_input(CaptureMode::Window)
            }
            Err(e) => Err(e),
        }
    }

    fn start_input(
        &self,
        mode: CaptureMode,
    ) -> Result<(Box<dyn InputSource>, Receiver<RawInputEvent>), CaptureError> {
        let mut source = self.backend.input_source(mode)?;
        let events = source.start()?;
        Ok((source, events))
    }

    /// Publishes `Active`, or tears down at once if a stop arrived while
    /// starting.
    fn publish_active(&self) {
        let guard = self.lifecycle.lock();
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.state.store(SessionState::Stopping as u8, Ordering::SeqCst);
            drop(guard);
            info!("stop requested while starting");
            self.teardown();
        } else {
            self.state.store(SessionState::Active as u8, Ordering::SeqCst);
            self.settled.notify_all();
        }
    }

    fn settle_idle(&self) {
        let _guard = self.lifecycle.lock();
        self.stop_requested.store(false, Ordering::SeqCst);
        self.state.store(SessionState::Idle as u8, Ordering::SeqCst);
        self.settled.notify_all();
    }

    fn stop(&self) {
        let mut guard = self.lifecycle.lock();
        loop {
            match self.state() {
                SessionState::Idle => return,
                SessionState::Active => {
                    if self.transition(SessionState::Active, SessionState::Stopping).is_ok() {
                        drop(guard);
                        self.teardown();
                        return;
                    }
                }
                SessionState::Starting => {
                    self.stop_requested.store(true, Ordering::SeqCst);
                    self.settled.wait(&mut guard);
                }
                SessionState::Stopping => self.settled.wait(&mut guard),
            }
        }
    }

    /// Stop issued by the dispatch thread.  It never waits: a concurrent
    /// teardown is joining this very thread.
    fn stop_from_dispatch(&self) {
        let won = {
            let _guard = self.lifecycle.lock();
            self.transition(SessionState::Active, SessionState::Stopping).is_ok()
        };
        if won {
            self.teardown();
        }
    }

    /// Releases everything held by the session and publishes `Idle`.
    fn teardown(&self) {
        let taken = self.session.lock().take();
        if let Some(mut session) = taken {
            let _enter = session.span.clone().entered();
            info!("stopping session");

            session.input.stop();
            session.dispatch_running.store(false, Ordering::SeqCst);
            if let Some(handle) = session.dispatch.take() {
                // A stop requested by the dispatch thread itself cannot wait
                // for that thread; it exits on its own after this returns.
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }

            if let Some(mut pump) = session.pump.take() {
                pump.stop();
            }
            session.video.stop();
            self.frames.clear();

            session.sink.close();
            info!(stats = ?session.sink.stats(), "session stopped");
        }

        self.settle_idle();
    }
}

/// Starts `video` with `format` and spawns a pump for it.
///
/// A source that refuses to start is not an error: the session carries on
/// without video and maps the pointer into the requested size.
fn start_video(
    video: &Arc<dyn VideoSource>,
    format: &VideoFormat,
    frames: &Arc<FrameSlot>,
) -> Result<(Option<VideoPump>, Size), VideoError> {
    if !video.start(format) {
        warn!(requested = %format, "video source did not start, continuing without video");
        return Ok((None, format.size()));
    }

    let (width, height) = video.actual_size();
    let actual = Size::new(width, height);
    if actual != format.size() {
        warn!("{}", VideoError::UnsupportedFormat { requested: *format, actual });
    }

    let pump = VideoPump::spawn(Arc::clone(video), Arc::clone(frames))?;
    Ok((Some(pump), actual))
}

/// State owned by the dispatch thread.
struct Dispatcher {
    shared: Arc<Shared>,
    surface: Arc<dyn CaptureSurface>,
    sink: Arc<dyn PacketSink>,
    normalizer: InputNormalizer,
    translator: InputTranslator,
}

impl Dispatcher {
    fn run(mut self, events: Receiver<RawInputEvent>, running: &AtomicBool) {
        debug!("dispatch started");
        while running.load(Ordering::SeqCst) {
            let raw = match events.recv_timeout(DISPATCH_POLL) {
                Ok(raw) => raw,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Modifiers are tracked even while inactive so the mask stays
            // true to the keys physically held.
            let Some(event) = self.normalizer.normalize(raw) else {
                continue;
            };
            if self.shared.state() != SessionState::Active {
                continue;
            }

            let remote = *self.shared.remote_size.lock();
            if remote != self.translator.video_size() {
                self.translator.set_video_size(remote);
            }

            let outcome = self.translator.translate(event, self.surface.size(), self.sink.as_ref());
            if outcome == Outcome::StopRequested {
                info!("middle button pressed, ending session");
                self.shared.stop_from_dispatch();
                break;
            }
        }
        debug!("dispatch finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::input_capture::mock::MockInputSource;
    use crate::infrastructure::input_capture::surface::FixedSurface;
    use crate::infrastructure::transport::recording::RecordingSink;
    use crate::infrastructure::video::test_pattern::TestPatternSource;
    use std::sync::mpsc;

    struct StubBackend {
        sink: RecordingSink,
        video: Arc<dyn VideoSource>,
    }

    impl SessionBackend for StubBackend {
        fn connect(&self, _: &SerialEndpoint) -> Result<Arc<dyn PacketSink>, TransportError> {
            Ok(Arc::new(self.sink.clone()))
        }

        fn input_source(&self, mode: CaptureMode) -> Result<Box<dyn InputSource>, CaptureError> {
            Ok(Box::new(MockInputSource::new(mode)))
        }

        fn surface(&self) -> Arc<dyn CaptureSurface> {
            Arc::new(FixedSurface::new(Size::new(1280, 720)))
        }

        fn video_source(&self) -> Arc<dyn VideoSource> {
            Arc::clone(&self.video)
        }
    }

    fn controller(video: Arc<dyn VideoSource>) -> SessionController {
        SessionController::new(Arc::new(StubBackend {
            sink: RecordingSink::new(),
            video,
        }))
    }

    fn config() -> SessionConfig {
        SessionConfig {
            video: VideoFormat::new(64, 36, 200),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            SessionState::Idle,
            SessionState::Starting,
            SessionState::Active,
            SessionState::Stopping,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_start_twice_is_rejected() {
        // Arrange
        let session = controller(Arc::new(TestPatternSource::new()));
        session.start(config()).expect("first start");

        // Act
        let second = session.start(config());

        // Assert
        assert!(matches!(
            second,
            Err(SessionError::InvalidState {
                expected: SessionState::Idle,
                actual: SessionState::Active
            })
        ));
        session.stop();
    }

    #[test]
    fn test_restart_video_updates_requested_format() {
        let session = controller(Arc::new(TestPatternSource::new()));
        session.start(config()).expect("start");

        session
            .restart_video(VideoFormat::new(32, 18, 100))
            .expect("restart while active");

        let info = session.video_info().expect("active session has video info");
        assert_eq!(info.requested, VideoFormat::new(32, 18, 100));
        assert_eq!(info.actual, Size::new(32, 18));
        session.stop();
    }

    #[test]
    fn test_restart_video_requires_active_session() {
        let session = controller(Arc::new(TestPatternSource::new()));

        let result = session.restart_video(VideoFormat::default());

        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn test_unavailable_video_keeps_requested_size() {
        let session = controller(Arc::new(TestPatternSource::unavailable()));

        session.start(config()).expect("video is optional");

        let info = session.video_info().expect("info");
        assert_eq!(info.actual, Size::new(64, 36));
        assert_eq!(info.measured_fps, 0.0);
        assert!(session.latest_frame().is_none());
        session.stop();
    }

    #[test]
    fn test_smaller_device_reports_actual_size() {
        let session = controller(Arc::new(TestPatternSource::with_max_size(Size::new(32, 18))));

        session.start(config()).expect("start");

        assert_eq!(session.video_info().map(|i| i.actual), Some(Size::new(32, 18)));
        session.stop();
    }

    #[test]
    fn test_stop_releases_everything_and_returns_to_idle() {
        let session = controller(Arc::new(TestPatternSource::new()));
        session.start(config()).expect("start");

        session.stop();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.session_id().is_none());
        assert!(session.video_info().is_none());
        assert!(session.latest_frame().is_none());
    }

    /// Backend whose `video_source()` blocks until released, holding the
    /// controller in `Starting`.
    struct SlowStartBackend {
        stub: StubBackend,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl SessionBackend for SlowStartBackend {
        fn connect(&self, endpoint: &SerialEndpoint) -> Result<Arc<dyn PacketSink>, TransportError> {
            self.stub.connect(endpoint)
        }

        fn input_source(&self, mode: CaptureMode) -> Result<Box<dyn InputSource>, CaptureError> {
            self.stub.input_source(mode)
        }

        fn surface(&self) -> Arc<dyn CaptureSurface> {
            self.stub.surface()
        }

        fn video_source(&self) -> Arc<dyn VideoSource> {
            let _ = self.gate.lock().recv();
            self.stub.video_source()
        }
    }

    #[test]
    fn test_stop_while_starting_is_honoured_before_active() {
        // Arrange
        let (release, gate) = mpsc::channel();
        let session = SessionController::new(Arc::new(SlowStartBackend {
            stub: StubBackend {
                sink: RecordingSink::new(),
                video: Arc::new(TestPatternSource::unavailable()),
            },
            gate: Mutex::new(gate),
        }));
        let starter = {
            let session = session.clone();
            thread::spawn(move || session.start(config()))
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while session.state() != SessionState::Starting && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        // Act
        let stopper = {
            let session = session.clone();
            thread::spawn(move || {
                session.stop();
                session.state()
            })
        };
        thread::sleep(Duration::from_millis(50));
        release.send(()).expect("backend waiting");

        // Assert
        let started = starter.join().expect("start thread");
        let after_stop = stopper.join().expect("stop thread");
        assert!(started.is_ok());
        assert_eq!(after_stop, SessionState::Idle);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.session_id().is_none());
    }

    #[test]
    fn test_media_key_requires_active_session() {
        let session = controller(Arc::new(TestPatternSource::new()));

        assert!(session.send_media_key(MediaKey::Mute).is_err());
    }
}
