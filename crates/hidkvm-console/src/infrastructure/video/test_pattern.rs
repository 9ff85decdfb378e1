//! Synthetic video source for test mode and headless runs.
//!
//! Produces scrolling colour bars at the requested frame rate.  It can be
//! given a maximum size to behave like a capture card that cannot deliver
//! the requested resolution, or be made unavailable altogether.

use std::thread;
use std::time::{Duration, Instant};

use hidkvm_core::Size;
use parking_lot::Mutex;
use tracing::debug;

use super::{VideoFormat, VideoFrame, VideoSource, BGR24_CHANNELS};

/// BGR colour bars: white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

#[derive(Debug, Default)]
struct PatternState {
    running: bool,
    size: Size,
    interval: Duration,
    next_due: Option<Instant>,
    sequence: u64,
}

/// A [`VideoSource`] that draws its own frames.
#[derive(Debug)]
pub struct TestPatternSource {
    max_size: Option<Size>,
    available: bool,
    state: Mutex<PatternState>,
}

impl TestPatternSource {
    /// A source that delivers any requested size.
    pub fn new() -> Self {
        Self {
            max_size: None,
            available: true,
            state: Mutex::new(PatternState::default()),
        }
    }

    /// A source that clamps frames to `max`.
    pub fn with_max_size(max: Size) -> Self {
        Self {
            max_size: Some(max),
            ..Self::new()
        }
    }

    /// A source whose `start()` always fails, like a missing device.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    fn render(size: Size, sequence: u64) -> Vec<u8> {
        let width = size.width as usize;
        let bar_width = (width / BARS.len()).max(1);
        let shift = (sequence as usize * 4) % width.max(1);

        let mut row = Vec::with_capacity(width * usize::from(BGR24_CHANNELS));
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            row.extend_from_slice(&BARS[bar]);
        }

        let mut data = Vec::with_capacity(row.len() * size.height as usize);
        for _ in 0..size.height {
            data.extend_from_slice(&row);
        }
        data
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for TestPatternSource {
    fn start(&self, format: &VideoFormat) -> bool {
        if !self.available || format.width == 0 || format.height == 0 {
            return false;
        }

        let size = match self.max_size {
            Some(max) => Size::new(format.width.min(max.width), format.height.min(max.height)),
            None => format.size(),
        };
        let fps = format.fps.max(1);

        let mut state = self.state.lock();
        *state = PatternState {
            running: true,
            size,
            interval: Duration::from_secs(1) / fps,
            next_due: None,
            sequence: 0,
        };
        debug!("test pattern started at {}x{} @ {fps}fps", size.width, size.height);
        true
    }

    fn read_frame(&self) -> Option<VideoFrame> {
        let (size, sequence, wait) = {
            let mut state = self.state.lock();
            if !state.running {
                return None;
            }
            let now = Instant::now();
            let due = state.next_due.unwrap_or(now);
            state.next_due = Some(due.max(now) + state.interval);
            state.sequence += 1;
            (state.size, state.sequence, due.saturating_duration_since(now))
        };

        if !wait.is_zero() {
            thread::sleep(wait);
        }

        Some(VideoFrame {
            data: Self::render(size, sequence),
            size,
            channels: BGR24_CHANNELS,
            sequence,
            captured_at: Instant::now(),
        })
    }

    fn stop(&self) {
        self.state.lock().running = false;
    }

    fn actual_size(&self) -> (u32, u32) {
        let size = self.state.lock().size;
        (size.width, size.height)
    }
}
