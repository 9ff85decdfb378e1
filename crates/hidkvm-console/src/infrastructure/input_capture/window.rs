//! Window-scoped input capture.
//!
//! The widget that shows the video forwards its key, button and wheel events
//! through a [`WindowInputHandle`].  Pointer motion is not pushed: a poll
//! thread samples the cursor every [`POLL_INTERVAL`] and emits a move only
//! when the cursor is over the widget and its position changed since the
//! last sample.  This keeps the move rate bounded at about 60 Hz however
//! fast the OS reports motion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidkvm_core::{KeyLookup, UsbHidLookup};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::surface::CaptureSurface;
use super::{CaptureError, CaptureMode, InputSource, RawInputEvent};

/// Cursor sampling period (about 60 Hz).
pub const POLL_INTERVAL: Duration = Duration::from_millis(16);

type SharedSender = Arc<Mutex<Option<Sender<RawInputEvent>>>>;

/// Input source fed by the video widget.
pub struct WindowInputSource {
    surface: Arc<dyn CaptureSurface>,
    keymap: Arc<dyn KeyLookup>,
    sender: SharedSender,
    running: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl WindowInputSource {
    /// A source whose key events carry USB HID usages.
    pub fn new(surface: Arc<dyn CaptureSurface>) -> Self {
        Self::with_keymap(surface, Arc::new(UsbHidLookup))
    }

    /// A source whose key events are translated through `keymap`.
    pub fn with_keymap(surface: Arc<dyn CaptureSurface>, keymap: Arc<dyn KeyLookup>) -> Self {
        Self {
            surface,
            keymap,
            sender: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            poller: None,
        }
    }

    /// Handle the widget uses to push its events.  Valid across restarts.
    pub fn handle(&self) -> WindowInputHandle {
        WindowInputHandle {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl InputSource for WindowInputSource {
    fn start(&mut self) -> Result<mpsc::Receiver<RawInputEvent>, CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel();
        *self.sender.lock() = Some(tx);

        let surface = Arc::clone(&self.surface);
        let sender = Arc::clone(&self.sender);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("hidkvm-cursor-poll".to_string())
            .spawn(move || poll_cursor(surface, sender, running));

        match spawned {
            Ok(handle) => {
                self.poller = Some(handle);
                debug!("window capture started");
                Ok(rx)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                *self.sender.lock() = None;
                Err(CaptureError::ThreadSpawn(e))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        *self.sender.lock() = None;
        if let Some(handle) = self.poller.take() {
            let _ = handle.join();
            debug!("window capture stopped");
        }
    }

    fn mode(&self) -> CaptureMode {
        CaptureMode::Window
    }

    fn keymap(&self) -> Arc<dyn KeyLookup> {
        Arc::clone(&self.keymap)
    }
}

impl Drop for WindowInputSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable handle for pushing widget events into a [`WindowInputSource`].
#[derive(Clone)]
pub struct WindowInputHandle {
    sender: SharedSender,
}

impl WindowInputHandle {
    /// Queues `event`.  Returns `false` if the source is not running.
    pub fn push(&self, event: RawInputEvent) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

fn poll_cursor(surface: Arc<dyn CaptureSurface>, sender: SharedSender, running: Arc<AtomicBool>) {
    let mut last: Option<(i32, i32)> = None;

    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let Some(position) = surface.cursor_position() else {
            continue;
        };
        if last == Some(position) {
            continue;
        }
        last = Some(position);

        let (x, y) = position;
        trace!(x, y, "cursor moved");
        let delivered = match sender.lock().as_ref() {
            Some(tx) => tx.send(RawInputEvent::PointerMove { x, y }).is_ok(),
            None => false,
        };
        if !delivered {
            break;
        }
    }
}
