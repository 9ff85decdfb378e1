//! Video capture infrastructure.
//!
//! The capture backend itself (device enumeration, decoding) sits behind the
//! [`VideoSource`] trait.  The console only needs to start it with a format,
//! learn the size it actually delivers and pull raw frames.  A pump thread
//! ([`pump::VideoPump`]) pulls continuously and parks the newest frame in a
//! [`pump::FrameSlot`]; a slow consumer simply skips frames.

use std::fmt;
use std::time::Instant;

use hidkvm_core::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod pump;
pub mod test_pattern;

/// Requested capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::new(1920, 1080, 30)
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Channel count of packed BGR24, the layout every source here produces.
pub const BGR24_CHANNELS: u8 = 3;

/// One raw frame, packed, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub size: Size,
    pub channels: u8,
    /// Monotonic counter assigned by the source.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.size.width as usize * usize::from(self.channels)
    }
}

/// Status reported to callers while a session runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub requested: VideoFormat,
    pub actual: Size,
    /// Frames per second over the last full second.
    pub measured_fps: f64,
}

/// Error type for the video pipeline.
#[derive(Debug, Error)]
pub enum VideoError {
    /// The device delivers a different size than requested.  The session
    /// keeps running at the actual size.
    #[error("requested {requested}, device delivers {}x{}", actual.width, actual.height)]
    UnsupportedFormat { requested: VideoFormat, actual: Size },

    #[error("failed to start video pump thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// A source of raw frames.
#[cfg_attr(test, mockall::automock)]
pub trait VideoSource: Send + Sync {
    /// Opens the device with `format`.  Returns `false` if it cannot start.
    fn start(&self, format: &VideoFormat) -> bool;

    /// Next frame, or `None` when none is ready yet or the source is stopped.
    fn read_frame(&self) -> Option<VideoFrame>;

    /// Releases the device.  Idempotent.
    fn stop(&self);

    /// Size of the frames actually delivered.
    fn actual_size(&self) -> (u32, u32);
}
