//! Input capture infrastructure.
//!
//! Two producers feed the same event stream:
//!
//! - **Window-scoped** ([`window::WindowInputSource`]): the video widget pushes
//!   key, button and wheel events, and a 60 Hz poll thread samples the cursor
//!   while it is over the widget.  Coordinates are widget pixels.
//! - **Global**: on Windows (`windows::GlobalHookSource`) `WH_KEYBOARD_LL`
//!   and `WH_MOUSE_LL` hooks on a dedicated Win32 message-loop thread; on
//!   Linux and macOS (`rdev_hook::RdevHookSource`) the `rdev` listener.
//!   Coordinates are screen pixels.
//!
//! Both hand out a `std::sync::mpsc::Receiver<RawInputEvent>`; the session's
//! dispatch thread is the single consumer.
//!
//! # Testability
//!
//! The [`InputSource`] trait lets tests inject synthetic events through
//! [`mock::MockInputSource`] without a window or OS hooks.

use std::sync::mpsc;
use std::sync::Arc;

use hidkvm_core::{KeyLookup, MouseButtons};
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod surface;
pub mod window;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(all(not(target_os = "windows"), feature = "global-hook"))]
pub mod rdev_hook;

/// A raw input event as produced by a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    /// A key went down.  `keycode` is in the source's own code space.
    KeyDown { keycode: u32 },
    /// A key went up.
    KeyUp { keycode: u32 },
    /// The cursor moved.
    PointerMove { x: i32, y: i32 },
    /// A mouse button was pressed.
    ButtonDown { button: MouseButtons, x: i32, y: i32 },
    /// A mouse button was released.
    ButtonUp { button: MouseButtons, x: i32, y: i32 },
    /// The vertical wheel turned.  Positive is away from the user.
    Wheel { delta: i32, x: i32, y: i32 },
}

/// Which producer supplies input for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Events only while the video widget has focus.
    #[default]
    Window,
    /// System-wide hooks; requires OS permission.
    Global,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Window => f.write_str("window"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Coordinate space of pointer positions in [`RawInputEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Already relative to the video widget's top-left corner.
    Widget,
    /// Desktop coordinates; must go through the capture surface.
    Screen,
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The OS refused to install a global hook (no accessibility/input
    /// monitoring permission, or no hook support on this platform).
    #[error("global input capture is not permitted: {0}")]
    PermissionDenied(String),
    #[error("failed to start capture thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    #[error("capture source is already running")]
    AlreadyRunning,
}

/// Trait abstracting input event production.
pub trait InputSource: Send {
    /// Starts the source and returns the receiving end of its event channel.
    fn start(&mut self) -> Result<mpsc::Receiver<RawInputEvent>, CaptureError>;

    /// Stops the source and releases OS resources.  Idempotent.  The channel
    /// disconnects once the producer side has been dropped.
    fn stop(&mut self);

    /// Capture mode this source implements.
    fn mode(&self) -> CaptureMode;

    /// Coordinate space of the pointer positions it reports.
    fn coordinate_space(&self) -> CoordinateSpace {
        match self.mode() {
            CaptureMode::Window => CoordinateSpace::Widget,
            CaptureMode::Global => CoordinateSpace::Screen,
        }
    }

    /// Lookup table for the key codes it reports.
    fn keymap(&self) -> Arc<dyn KeyLookup>;
}

/// Creates the OS-level global source for this platform.
///
/// # Errors
///
/// [`CaptureError::PermissionDenied`] when built without the `global-hook`
/// feature on Linux or macOS.  Missing OS permission is reported later, by
/// the source's `start()`.
pub fn global_source() -> Result<Box<dyn InputSource>, CaptureError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::GlobalHookSource::new()))
    }

    #[cfg(all(not(target_os = "windows"), feature = "global-hook"))]
    {
        Ok(Box::new(rdev_hook::RdevHookSource::new()))
    }

    #[cfg(all(not(target_os = "windows"), not(feature = "global-hook")))]
    {
        Err(CaptureError::PermissionDenied(format!(
            "no global hook backend on {}",
            std::env::consts::OS
        )))
    }
}
