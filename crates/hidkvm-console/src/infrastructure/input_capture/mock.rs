//! Mock input source for tests.
//!
//! Allows tests to inject synthetic [`RawInputEvent`]s without a widget or
//! OS hooks, and to simulate a source that the OS refuses to start.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use hidkvm_core::{KeyLookup, UsbHidLookup};
use parking_lot::Mutex;

use super::{CaptureError, CaptureMode, InputSource, RawInputEvent};

/// A mock implementation of [`InputSource`] that allows tests to inject events.
pub struct MockInputSource {
    mode: CaptureMode,
    deny: bool,
    keymap: Arc<dyn KeyLookup>,
    sender: Arc<Mutex<Option<Sender<RawInputEvent>>>>,
    starts: Arc<Mutex<u32>>,
    stops: Arc<Mutex<u32>>,
}

impl MockInputSource {
    /// Creates a mock source that reports `mode` and HID usages.
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            deny: false,
            keymap: Arc::new(UsbHidLookup),
            sender: Arc::new(Mutex::new(None)),
            starts: Arc::new(Mutex::new(0)),
            stops: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates a mock whose `start()` fails with `PermissionDenied`.
    pub fn denied(mode: CaptureMode) -> Self {
        Self {
            deny: true,
            ..Self::new(mode)
        }
    }

    /// Replaces the key lookup table.
    pub fn with_keymap(mut self, keymap: Arc<dyn KeyLookup>) -> Self {
        self.keymap = keymap;
        self
    }

    /// Returns a handle that injects into this source after it is boxed.
    pub fn injector(&self) -> MockInjector {
        MockInjector {
            sender: Arc::clone(&self.sender),
            starts: Arc::clone(&self.starts),
            stops: Arc::clone(&self.stops),
        }
    }
}

impl InputSource for MockInputSource {
    fn start(&mut self) -> Result<mpsc::Receiver<RawInputEvent>, CaptureError> {
        *self.starts.lock() += 1;
        if self.deny {
            return Err(CaptureError::PermissionDenied(
                "mock source configured to deny".to_string(),
            ));
        }
        let (tx, rx) = mpsc::channel();
        *self.sender.lock() = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        *self.stops.lock() += 1;
        // Drop the sender to close the channel.
        *self.sender.lock() = None;
    }

    fn mode(&self) -> CaptureMode {
        self.mode
    }

    fn keymap(&self) -> Arc<dyn KeyLookup> {
        Arc::clone(&self.keymap)
    }
}

/// Test-side handle onto a [`MockInputSource`].
#[derive(Clone)]
pub struct MockInjector {
    sender: Arc<Mutex<Option<Sender<RawInputEvent>>>>,
    starts: Arc<Mutex<u32>>,
    stops: Arc<Mutex<u32>>,
}

impl MockInjector {
    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// Returns `false` if the source is not running.
    pub fn inject(&self, event: RawInputEvent) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Number of `start()` calls, successful or not.
    pub fn start_count(&self) -> u32 {
        *self.starts.lock()
    }

    /// Number of `stop()` calls.
    pub fn stop_count(&self) -> u32 {
        *self.stops.lock()
    }

    /// Returns `true` while the source is started.
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}
