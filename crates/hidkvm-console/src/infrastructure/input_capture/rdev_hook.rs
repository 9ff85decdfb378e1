//! Global capture on Linux (X11) and macOS through `rdev`.
//!
//! `rdev::listen` blocks for as long as it works and cannot be cancelled, so
//! a single listener thread is started on first use and lives for the rest
//! of the process.  Sources attach by filling a shared sender slot and detach
//! by clearing it; with no source attached the callback drops events.
//!
//! The listener reports failure by returning.  Without the macOS
//! Accessibility permission, or without an X display on Linux, it returns
//! almost at once, which `start()` maps to [`CaptureError::PermissionDenied`].
//! Events are observed, never grabbed: the local desktop keeps them.

#![cfg(all(not(target_os = "windows"), feature = "global-hook"))]

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hidkvm_core::keymap::hid;
use hidkvm_core::{KeyLookup, MouseButtons, UsbHidLookup};
use parking_lot::Mutex;
use rdev::{Button, EventType, Key};
use tracing::{debug, warn};

use super::{CaptureError, CaptureMode, InputSource, RawInputEvent};

/// Sender used by the listener callback.  Only one source is attached at a
/// time.
static EVENT_SENDER: Mutex<Option<Sender<RawInputEvent>>> = Mutex::new(None);

static LISTENER: Mutex<ListenerState> = Mutex::new(ListenerState::NotStarted);

/// A listener still running after this long is taken to be working.
const LISTEN_FAILURE_WINDOW: Duration = Duration::from_millis(300);

/// Wheel units per notch, matching the Windows hook.
const WHEEL_DELTA: i32 = 120;

enum ListenerState {
    NotStarted,
    Running,
    Failed(String),
}

/// System-wide capture through the `rdev` listener.
///
/// Key codes are reported as HID usages, so the keymap is [`UsbHidLookup`].
pub struct RdevHookSource {
    attached: bool,
}

impl RdevHookSource {
    pub fn new() -> Self {
        Self { attached: false }
    }
}

impl Default for RdevHookSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for RdevHookSource {
    fn start(&mut self) -> Result<mpsc::Receiver<RawInputEvent>, CaptureError> {
        if self.attached || EVENT_SENDER.lock().is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        ensure_listener()?;

        let (tx, rx) = mpsc::channel();
        let mut slot = EVENT_SENDER.lock();
        if slot.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        *slot = Some(tx);
        self.attached = true;
        debug!("global listener attached");
        Ok(rx)
    }

    fn stop(&mut self) {
        if self.attached {
            self.attached = false;
            *EVENT_SENDER.lock() = None;
            debug!("global listener detached");
        }
    }

    fn mode(&self) -> CaptureMode {
        CaptureMode::Global
    }

    fn keymap(&self) -> Arc<dyn KeyLookup> {
        Arc::new(UsbHidLookup)
    }
}

impl Drop for RdevHookSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts the process-wide listener thread unless it already runs.
fn ensure_listener() -> Result<(), CaptureError> {
    let mut state = LISTENER.lock();
    match &*state {
        ListenerState::Running => return Ok(()),
        ListenerState::Failed(reason) => return Err(CaptureError::PermissionDenied(reason.clone())),
        ListenerState::NotStarted => {}
    }

    let (failed_tx, failed_rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("hidkvm-rdev-listen".to_string())
        .spawn(move || {
            let mut tracker = PointerTracker::default();
            let result = rdev::listen(move |event| {
                if let Some(raw) = tracker.translate(event.event_type) {
                    deliver(raw);
                }
            });
            let reason = match result {
                Ok(()) => "listener returned".to_string(),
                Err(e) => format!("{e:?}"),
            };
            warn!("global input listener ended: {reason}");
            let _ = failed_tx.send(reason.clone());
            *LISTENER.lock() = ListenerState::Failed(reason);
            // Disconnects the attached consumer, if any.
            *EVENT_SENDER.lock() = None;
        })?;

    match failed_rx.recv_timeout(LISTEN_FAILURE_WINDOW) {
        Err(RecvTimeoutError::Timeout) => {
            *state = ListenerState::Running;
            debug!("global input listener running");
            Ok(())
        }
        Ok(reason) => {
            *state = ListenerState::Failed(reason.clone());
            Err(CaptureError::PermissionDenied(reason))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let reason = "listener thread exited".to_string();
            *state = ListenerState::Failed(reason.clone());
            Err(CaptureError::PermissionDenied(reason))
        }
    }
}

fn deliver(event: RawInputEvent) {
    if let Some(sender) = EVENT_SENDER.lock().as_ref() {
        let _ = sender.send(event);
    }
}

/// Turns `rdev` events into raw events.  Button and wheel events carry no
/// position, so the last reported cursor position is attached.
#[derive(Debug, Default)]
struct PointerTracker {
    x: i32,
    y: i32,
}

impl PointerTracker {
    fn translate(&mut self, event: EventType) -> Option<RawInputEvent> {
        let (x, y) = (self.x, self.y);
        match event {
            EventType::KeyPress(key) => key_to_hid(key).map(|usage| RawInputEvent::KeyDown {
                keycode: u32::from(usage),
            }),
            EventType::KeyRelease(key) => key_to_hid(key).map(|usage| RawInputEvent::KeyUp {
                keycode: u32::from(usage),
            }),
            EventType::MouseMove { x, y } => {
                self.x = x as i32;
                self.y = y as i32;
                Some(RawInputEvent::PointerMove { x: self.x, y: self.y })
            }
            EventType::ButtonPress(button) => {
                map_button(button).map(|button| RawInputEvent::ButtonDown { button, x, y })
            }
            EventType::ButtonRelease(button) => {
                map_button(button).map(|button| RawInputEvent::ButtonUp { button, x, y })
            }
            EventType::Wheel { delta_y: 0, .. } => None,
            EventType::Wheel { delta_y, .. } => {
                let notches = delta_y.clamp(-1_000, 1_000) as i32;
                Some(RawInputEvent::Wheel {
                    delta: notches * WHEEL_DELTA,
                    x,
                    y,
                })
            }
        }
    }
}

fn map_button(button: Button) -> Option<MouseButtons> {
    match button {
        Button::Left => Some(MouseButtons::LEFT),
        Button::Right => Some(MouseButtons::RIGHT),
        Button::Middle => Some(MouseButtons::MIDDLE),
        Button::Unknown(_) => None,
    }
}

/// HID usage (page 0x07) for an `rdev` key.
fn key_to_hid(key: Key) -> Option<u8> {
    let usage = match key {
        Key::KeyA => hid::KEY_A,
        Key::KeyB => 0x05,
        Key::KeyC => hid::KEY_C,
        Key::KeyD => 0x07,
        Key::KeyE => 0x08,
        Key::KeyF => 0x09,
        Key::KeyG => 0x0A,
        Key::KeyH => 0x0B,
        Key::KeyI => 0x0C,
        Key::KeyJ => 0x0D,
        Key::KeyK => 0x0E,
        Key::KeyL => 0x0F,
        Key::KeyM => 0x10,
        Key::KeyN => 0x11,
        Key::KeyO => 0x12,
        Key::KeyP => 0x13,
        Key::KeyQ => 0x14,
        Key::KeyR => 0x15,
        Key::KeyS => 0x16,
        Key::KeyT => 0x17,
        Key::KeyU => 0x18,
        Key::KeyV => 0x19,
        Key::KeyW => 0x1A,
        Key::KeyX => 0x1B,
        Key::KeyY => 0x1C,
        Key::KeyZ => hid::KEY_Z,
        Key::Num1 => hid::DIGIT_1,
        Key::Num2 => 0x1F,
        Key::Num3 => 0x20,
        Key::Num4 => 0x21,
        Key::Num5 => 0x22,
        Key::Num6 => 0x23,
        Key::Num7 => 0x24,
        Key::Num8 => 0x25,
        Key::Num9 => 0x26,
        Key::Num0 => hid::DIGIT_0,
        Key::Return => hid::ENTER,
        Key::Escape => hid::ESCAPE,
        Key::Backspace => hid::BACKSPACE,
        Key::Tab => hid::TAB,
        Key::Space => hid::SPACE,
        Key::Minus => 0x2D,
        Key::Equal => 0x2E,
        Key::LeftBracket => 0x2F,
        Key::RightBracket => 0x30,
        Key::BackSlash => 0x31,
        Key::SemiColon => 0x33,
        Key::Quote => 0x34,
        Key::BackQuote => 0x35,
        Key::Comma => 0x36,
        Key::Dot => 0x37,
        Key::Slash => 0x38,
        Key::CapsLock => 0x39,
        Key::F1 => hid::F1,
        Key::F2 => 0x3B,
        Key::F3 => 0x3C,
        Key::F4 => 0x3D,
        Key::F5 => 0x3E,
        Key::F6 => 0x3F,
        Key::F7 => 0x40,
        Key::F8 => 0x41,
        Key::F9 => 0x42,
        Key::F10 => 0x43,
        Key::F11 => 0x44,
        Key::F12 => hid::F12,
        Key::PrintScreen => 0x46,
        Key::ScrollLock => 0x47,
        Key::Pause => 0x48,
        Key::Insert => 0x49,
        Key::Home => 0x4A,
        Key::PageUp => 0x4B,
        Key::Delete => hid::DELETE,
        Key::End => 0x4D,
        Key::PageDown => 0x4E,
        Key::RightArrow => 0x4F,
        Key::LeftArrow => 0x50,
        Key::DownArrow => 0x51,
        Key::UpArrow => 0x52,
        Key::NumLock => 0x53,
        Key::KpDivide => 0x54,
        Key::KpMultiply => 0x55,
        Key::KpMinus => 0x56,
        Key::KpPlus => 0x57,
        Key::KpReturn => 0x58,
        Key::Kp1 => 0x59,
        Key::Kp2 => 0x5A,
        Key::Kp3 => 0x5B,
        Key::Kp4 => 0x5C,
        Key::Kp5 => 0x5D,
        Key::Kp6 => 0x5E,
        Key::Kp7 => 0x5F,
        Key::Kp8 => 0x60,
        Key::Kp9 => 0x61,
        Key::Kp0 => 0x62,
        Key::KpDelete => 0x63,
        Key::IntlBackslash => 0x64,
        Key::ControlLeft => hid::LEFT_CTRL,
        Key::ShiftLeft => hid::LEFT_SHIFT,
        Key::Alt => hid::LEFT_ALT,
        Key::MetaLeft => hid::LEFT_META,
        Key::ControlRight => hid::RIGHT_CTRL,
        Key::ShiftRight => hid::RIGHT_SHIFT,
        Key::AltGr => hid::RIGHT_ALT,
        Key::MetaRight => hid::RIGHT_META,
        _ => return None,
    };
    Some(usage)
}
