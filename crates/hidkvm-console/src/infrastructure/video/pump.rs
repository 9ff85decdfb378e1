//! Video pump thread and latest-frame slot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{VideoError, VideoFrame, VideoSource};

/// Pause between polls while the source has no frame ready.
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Window over which the frame rate is measured.
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Holds at most one frame: the newest.
///
/// Publishing replaces whatever is there, so a consumer that falls behind
/// sees the current picture instead of a backlog.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<Arc<VideoFrame>>>,
    published: AtomicU64,
    superseded: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame`, replacing any frame not yet taken.
    pub fn publish(&self, frame: VideoFrame) {
        let previous = self.frame.lock().replace(Arc::new(frame));
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes and returns the newest frame.
    pub fn take(&self) -> Option<Arc<VideoFrame>> {
        self.frame.lock().take()
    }

    /// Returns the newest frame without removing it.
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.frame.lock().clone()
    }

    pub fn clear(&self) {
        self.frame.lock().take();
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before anyone took them.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}

/// Thread that drains a [`VideoSource`] into a [`FrameSlot`].
pub struct VideoPump {
    running: Arc<AtomicBool>,
    fps_bits: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl VideoPump {
    /// Spawns the pump.  The source must already be started.
    ///
    /// # Errors
    ///
    /// [`VideoError::ThreadSpawn`] if the thread cannot be created.
    pub fn spawn(source: Arc<dyn VideoSource>, slot: Arc<FrameSlot>) -> Result<Self, VideoError> {
        let running = Arc::new(AtomicBool::new(true));
        let fps_bits = Arc::new(AtomicU64::new(0f64.to_bits()));

        let worker = {
            let running = Arc::clone(&running);
            let fps_bits = Arc::clone(&fps_bits);
            thread::Builder::new()
                .name("hidkvm-video-pump".to_string())
                .spawn(move || run_pump(source, slot, running, fps_bits))?
        };

        Ok(Self {
            running,
            fps_bits,
            worker: Some(worker),
        })
    }

    /// Frames per second measured over the last full window.
    pub fn measured_fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    /// Stops the thread and waits for it.  Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("video pump stopped");
        }
    }
}

impl Drop for VideoPump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_pump(
    source: Arc<dyn VideoSource>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    fps_bits: Arc<AtomicU64>,
) {
    let mut window_start = Instant::now();
    let mut frames_in_window = 0u32;

    while running.load(Ordering::SeqCst) {
        match source.read_frame() {
            Some(frame) => {
                trace!(sequence = frame.sequence, "frame");
                slot.publish(frame);
                frames_in_window += 1;
            }
            None => thread::sleep(IDLE_BACKOFF),
        }

        let elapsed = window_start.elapsed();
        if elapsed >= FPS_WINDOW {
            let fps = f64::from(frames_in_window) / elapsed.as_secs_f64();
            fps_bits.store(fps.to_bits(), Ordering::Relaxed);
            frames_in_window = 0;
            window_start = Instant::now();
        }
    }
}
