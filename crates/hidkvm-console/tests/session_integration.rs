//! Integration tests for the session lifecycle and the input → packet path.
//!
//! A stub backend hands the controller a recording sink, mock input sources
//! and a video source that never starts, so the remote screen size is the
//! requested format.  Events are injected through the mock and the test waits
//! for the dispatch thread to produce packets.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hidkvm_console::application::session::{
    SessionBackend, SessionController, SessionError, SessionState,
};
use hidkvm_console::application::session_config::{PointerMode, SessionConfig};
use hidkvm_console::infrastructure::input_capture::mock::{MockInjector, MockInputSource};
use hidkvm_console::infrastructure::input_capture::surface::{CaptureSurface, FixedSurface};
use hidkvm_console::infrastructure::input_capture::{
    CaptureError, CaptureMode, InputSource, RawInputEvent,
};
use hidkvm_console::infrastructure::transport::recording::RecordingSink;
use hidkvm_console::infrastructure::transport::{
    PacketSink, SerialEndpoint, TransportError, TransportStats,
};
use hidkvm_console::infrastructure::video::test_pattern::TestPatternSource;
use hidkvm_console::infrastructure::video::{VideoFormat, VideoSource};
use hidkvm_core::keymap::hid;
use hidkvm_core::protocol::codec::CHAR_KEY_UP_PACKET;
use hidkvm_core::{DevicePacket, MediaKey, MouseButtons, PacketSequence, Size};
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(2);

// ── Test backend ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Behaviour {
    deny_global: bool,
    deny_window: bool,
    refuse_port: bool,
    /// How long the sink's `close()` blocks.
    close_delay: Option<Duration>,
}

/// Recording sink whose `close()` takes a while, like a port draining.
struct SlowCloseSink {
    inner: RecordingSink,
    delay: Duration,
}

impl PacketSink for SlowCloseSink {
    fn submit(&self, packet: DevicePacket) {
        self.inner.submit(packet);
    }

    fn submit_sequence(&self, sequence: PacketSequence) {
        self.inner.submit_sequence(sequence);
    }

    fn submit_move(&self, packet: DevicePacket) -> bool {
        self.inner.submit_move(packet)
    }

    fn close(&self) {
        thread::sleep(self.delay);
        self.inner.close();
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

struct TestBackend {
    behaviour: Behaviour,
    sink: RecordingSink,
    surface: Arc<FixedSurface>,
    injectors: Mutex<Vec<(CaptureMode, MockInjector)>>,
    connects: Mutex<u32>,
}

impl TestBackend {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            sink: RecordingSink::new(),
            // 5:4 widget around 16:9 video: 152 px bars top and bottom.
            surface: Arc::new(FixedSurface::new(Size::new(1280, 1024))),
            injectors: Mutex::new(Vec::new()),
            connects: Mutex::new(0),
        })
    }

    fn injector(&self, mode: CaptureMode) -> MockInjector {
        self.injectors
            .lock()
            .iter()
            .rev()
            .find(|(m, _)| *m == mode)
            .map(|(_, i)| i.clone())
            .expect("an input source of this mode was created")
    }
}

impl SessionBackend for TestBackend {
    fn connect(&self, endpoint: &SerialEndpoint) -> Result<Arc<dyn PacketSink>, TransportError> {
        *self.connects.lock() += 1;
        if self.behaviour.refuse_port {
            return Err(TransportError::Connection {
                endpoint: endpoint.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged"),
            });
        }
        match self.behaviour.close_delay {
            Some(delay) => Ok(Arc::new(SlowCloseSink {
                inner: self.sink.clone(),
                delay,
            })),
            None => Ok(Arc::new(self.sink.clone())),
        }
    }

    fn input_source(&self, mode: CaptureMode) -> Result<Box<dyn InputSource>, CaptureError> {
        let denied = match mode {
            CaptureMode::Global => self.behaviour.deny_global,
            CaptureMode::Window => self.behaviour.deny_window,
        };
        let source = if denied {
            MockInputSource::denied(mode)
        } else {
            MockInputSource::new(mode)
        };
        self.injectors.lock().push((mode, source.injector()));
        Ok(Box::new(source))
    }

    fn surface(&self) -> Arc<dyn CaptureSurface> {
        self.surface.clone()
    }

    fn video_source(&self) -> Arc<dyn VideoSource> {
        Arc::new(TestPatternSource::unavailable())
    }
}

fn serial_config() -> SessionConfig {
    SessionConfig {
        video: VideoFormat::new(1920, 1080, 30),
        serial: Some(SerialEndpoint::new("/dev/ttyUSB0", 9600)),
        ..SessionConfig::default()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn test_stop_is_idempotent_across_threads() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");
    let injector = backend.injector(CaptureMode::Window);

    // Act
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || session.stop())
        })
        .collect();
    for handle in handles {
        handle.join().expect("stop thread");
    }
    session.stop();

    // Assert
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(injector.stop_count(), 1, "input torn down exactly once");
    assert!(backend.sink.is_closed());
}

#[test]
fn test_every_concurrent_stop_returns_only_once_idle() {
    // Arrange
    let backend = TestBackend::new(Behaviour {
        close_delay: Some(Duration::from_millis(200)),
        ..Behaviour::default()
    });
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");

    // Act: each thread samples the state the moment its stop() returns.
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                session.stop();
                session.state()
            })
        })
        .collect();
    let observed: Vec<SessionState> = handles
        .into_iter()
        .map(|handle| handle.join().expect("stop thread"))
        .collect();

    // Assert
    assert_eq!(observed, vec![SessionState::Idle; 4]);
    assert!(backend.sink.is_closed());
}

#[test]
fn test_start_right_after_a_losing_stop_succeeds() {
    let backend = TestBackend::new(Behaviour {
        close_delay: Some(Duration::from_millis(200)),
        ..Behaviour::default()
    });
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");

    let winner = {
        let session = session.clone();
        thread::spawn(move || session.stop())
    };
    assert!(wait_until(|| session.state() == SessionState::Stopping));
    session.stop();
    let restarted = session.start(serial_config());

    assert!(restarted.is_ok(), "{restarted:?}");
    winner.join().expect("stop thread");
    session.stop();
}

#[test]
fn test_stop_on_idle_controller_is_a_no_op() {
    let session = SessionController::new(TestBackend::new(Behaviour::default()));

    session.stop();
    session.stop();

    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_session_can_restart_after_stop() {
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());

    let first = session.start(serial_config()).expect("first start");
    session.stop();
    let second = session.start(serial_config()).expect("second start");

    assert_ne!(first, second);
    assert_eq!(session.session_id(), Some(second));
    session.stop();
}

// ── Transport selection ───────────────────────────────────────────────────────

#[test]
fn test_missing_endpoint_selects_null_sink() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    let config = SessionConfig {
        serial: None,
        ..serial_config()
    };

    // Act
    session.start(config).expect("start");

    // Assert
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.transport_description().as_deref(), Some("null"));
    assert_eq!(*backend.connects.lock(), 0);
    session.stop();
}

#[test]
fn test_test_mode_never_opens_the_port() {
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());

    session
        .start(SessionConfig {
            test_mode: true,
            ..serial_config()
        })
        .expect("start");

    assert_eq!(*backend.connects.lock(), 0);
    assert_eq!(session.transport_description().as_deref(), Some("null"));
    session.stop();
}

#[test]
fn test_unavailable_port_falls_back_to_null_sink() {
    let backend = TestBackend::new(Behaviour {
        refuse_port: true,
        ..Behaviour::default()
    });
    let session = SessionController::new(backend.clone());

    session.start(serial_config()).expect("a missing port is not fatal");

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(*backend.connects.lock(), 1);
    assert_eq!(session.transport_description().as_deref(), Some("null"));
    session.stop();
}

// ── Input selection ───────────────────────────────────────────────────────────

#[test]
fn test_permission_denied_falls_back_to_window_capture() {
    // Arrange
    let backend = TestBackend::new(Behaviour {
        deny_global: true,
        ..Behaviour::default()
    });
    let session = SessionController::new(backend.clone());

    // Act
    session
        .start(SessionConfig {
            capture_mode: CaptureMode::Global,
            ..serial_config()
        })
        .expect("window fallback");

    // Assert
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.active_mode(), Some(CaptureMode::Window));
    assert_eq!(backend.injector(CaptureMode::Global).start_count(), 1);
    assert!(backend.injector(CaptureMode::Window).is_running());
    session.stop();
}

#[test]
fn test_no_input_source_aborts_start_and_releases_transport() {
    // Arrange
    let backend = TestBackend::new(Behaviour {
        deny_global: true,
        deny_window: true,
        ..Behaviour::default()
    });
    let session = SessionController::new(backend.clone());

    // Act
    let result = session.start(SessionConfig {
        capture_mode: CaptureMode::Global,
        ..serial_config()
    });

    // Assert
    assert!(matches!(result, Err(SessionError::InputUnavailable(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(backend.sink.is_closed(), "acquired transport released");
}

// ── Input → packets ───────────────────────────────────────────────────────────

#[test]
fn test_key_press_reaches_the_port_as_a_tap() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");
    let injector = backend.injector(CaptureMode::Window);

    // Act
    injector.inject(RawInputEvent::KeyDown { keycode: u32::from(hid::KEY_A) });
    injector.inject(RawInputEvent::KeyUp { keycode: u32::from(hid::KEY_A) });

    // Assert
    assert!(wait_until(|| backend.sink.packets().len() >= 2));
    let packets = backend.sink.packets();
    assert_eq!(packets[0][3], 0x02);
    assert_eq!(packets[0][7], hid::KEY_A);
    assert_eq!(packets[1].as_slice(), &CHAR_KEY_UP_PACKET[..]);
    session.stop();
    assert_eq!(backend.sink.packets().len(), 2, "key release adds nothing");
}

#[test]
fn test_modifier_released_first_is_not_applied_to_later_keys() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");
    let injector = backend.injector(CaptureMode::Window);
    let ctrl = u32::from(hid::LEFT_CTRL);
    let a = u32::from(hid::KEY_A);
    let c = u32::from(hid::KEY_C);

    // Act
    injector.inject(RawInputEvent::KeyDown { keycode: ctrl });
    injector.inject(RawInputEvent::KeyDown { keycode: a });
    injector.inject(RawInputEvent::KeyUp { keycode: ctrl });
    injector.inject(RawInputEvent::KeyUp { keycode: a });
    injector.inject(RawInputEvent::KeyDown { keycode: c });

    // Assert
    assert!(wait_until(|| backend.sink.packets().len() >= 4));
    let packets = backend.sink.packets();
    assert_eq!((packets[0][5], packets[0][7]), (0x01, hid::KEY_A));
    assert_eq!((packets[2][5], packets[2][7]), (0x00, hid::KEY_C));
    session.stop();
}

#[test]
fn test_pointer_on_letterbox_bar_is_discarded() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");
    let injector = backend.injector(CaptureMode::Window);

    // Act
    injector.inject(RawInputEvent::ButtonDown { button: MouseButtons::LEFT, x: 640, y: 100 });
    injector.inject(RawInputEvent::Wheel { delta: 120, x: 640, y: 1000 });
    injector.inject(RawInputEvent::PointerMove { x: 640, y: 512 });

    // Assert
    assert!(wait_until(|| !backend.sink.packets().is_empty()));
    let packets = backend.sink.packets();
    assert_eq!(packets.len(), 1, "only the in-picture move is sent");
    let x = u16::from_le_bytes([packets[0][7], packets[0][8]]);
    let y = u16::from_le_bytes([packets[0][9], packets[0][10]]);
    assert!(x.abs_diff(2048) <= 1 && y.abs_diff(2048) <= 1);
    session.stop();
}

#[test]
fn test_relative_moves_are_coalesced_while_one_is_in_flight() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    backend.sink.hold_moves(true);
    let session = SessionController::new(backend.clone());
    session
        .start(SessionConfig {
            pointer_mode: PointerMode::Relative,
            ..serial_config()
        })
        .expect("start");
    let injector = backend.injector(CaptureMode::Window);

    // Act
    for x in [600, 610, 620, 630, 640] {
        injector.inject(RawInputEvent::PointerMove { x, y: 512 });
    }
    injector.inject(RawInputEvent::ButtonDown { button: MouseButtons::RIGHT, x: 640, y: 512 });

    // Assert
    assert!(wait_until(|| backend.sink.packets().len() >= 2));
    let stats = session.transport_stats().expect("active session has stats");
    assert_eq!(stats.coalesced, 4, "four moves hit the gate, the button did not");
    let packets = backend.sink.packets();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1][6], MouseButtons::RIGHT.0);
    session.stop();
}

#[test]
fn test_middle_press_ends_the_session_without_forwarding() {
    // Arrange
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");
    let injector = backend.injector(CaptureMode::Window);

    // Act
    injector.inject(RawInputEvent::ButtonDown { button: MouseButtons::MIDDLE, x: 640, y: 512 });

    // Assert
    assert!(wait_until(|| session.state() == SessionState::Idle));
    assert!(backend.sink.packets().is_empty());
    assert!(backend.sink.is_closed());
    assert!(!injector.inject(RawInputEvent::KeyDown { keycode: 4 }), "input released");
}

#[test]
fn test_media_key_is_sent_while_active() {
    let backend = TestBackend::new(Behaviour::default());
    let session = SessionController::new(backend.clone());
    session.start(serial_config()).expect("start");

    session.send_media_key(MediaKey::VolumeUp).expect("active");

    assert_eq!(backend.sink.commands(), vec![0x03, 0x03]);
    session.stop();
}
