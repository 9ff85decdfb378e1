//! Production wiring of the session's OS-facing parts.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::application::session::SessionBackend;
use crate::infrastructure::input_capture::surface::CaptureSurface;
use crate::infrastructure::input_capture::window::{WindowInputHandle, WindowInputSource};
use crate::infrastructure::input_capture::{global_source, CaptureError, CaptureMode, InputSource};
use crate::infrastructure::transport::serial::TransportDriver;
use crate::infrastructure::transport::{PacketSink, SerialEndpoint, TransportError};
use crate::infrastructure::video::VideoSource;

/// Serial port, OS hooks or widget input, and the given video source.
pub struct SystemBackend {
    surface: Arc<dyn CaptureSurface>,
    video: Arc<dyn VideoSource>,
    window_handle: Mutex<Option<WindowInputHandle>>,
}

impl SystemBackend {
    pub fn new(surface: Arc<dyn CaptureSurface>, video: Arc<dyn VideoSource>) -> Self {
        Self {
            surface,
            video,
            window_handle: Mutex::new(None),
        }
    }

    /// Push handle of the most recently created window source, for the
    /// widget that forwards key and button events.
    pub fn window_handle(&self) -> Option<WindowInputHandle> {
        self.window_handle.lock().clone()
    }
}

impl SessionBackend for SystemBackend {
    fn connect(&self, endpoint: &SerialEndpoint) -> Result<Arc<dyn PacketSink>, TransportError> {
        let driver = TransportDriver::open(endpoint)?;
        Ok(Arc::new(driver))
    }

    fn input_source(&self, mode: CaptureMode) -> Result<Box<dyn InputSource>, CaptureError> {
        match mode {
            CaptureMode::Global => global_source(),
            CaptureMode::Window => {
                let source = WindowInputSource::new(Arc::clone(&self.surface));
                *self.window_handle.lock() = Some(source.handle());
                debug!("window input source created");
                Ok(Box::new(source))
            }
        }
    }

    fn surface(&self) -> Arc<dyn CaptureSurface> {
        Arc::clone(&self.surface)
    }

    fn video_source(&self) -> Arc<dyn VideoSource> {
        Arc::clone(&self.video)
    }
}
