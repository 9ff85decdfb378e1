//! The on-screen area that shows the remote video.
//!
//! The presentation layer owns the real widget; the console only needs three
//! facts about it, captured by [`CaptureSurface`].  [`FixedSurface`] is a
//! plain in-memory implementation used by the headless binary and by tests.

use hidkvm_core::Size;
use parking_lot::Mutex;

/// Read-only view of the video widget.
pub trait CaptureSurface: Send + Sync {
    /// Current widget size in pixels.
    fn size(&self) -> Size;

    /// Cursor position in widget pixels, or `None` while the cursor is
    /// outside the widget.
    fn cursor_position(&self) -> Option<(i32, i32)>;

    /// Converts desktop coordinates into widget coordinates.
    fn map_from_global(&self, x: i32, y: i32) -> (i32, i32);
}

/// A surface with a settable size, desktop origin and cursor.
#[derive(Debug)]
pub struct FixedSurface {
    inner: Mutex<SurfaceState>,
}

#[derive(Debug, Clone, Copy)]
struct SurfaceState {
    size: Size,
    origin: (i32, i32),
    cursor: Option<(i32, i32)>,
}

impl FixedSurface {
    /// A surface of `size` placed at the desktop origin.
    pub fn new(size: Size) -> Self {
        Self::at(size, (0, 0))
    }

    /// A surface of `size` whose top-left corner sits at `origin` on the desktop.
    pub fn at(size: Size, origin: (i32, i32)) -> Self {
        Self {
            inner: Mutex::new(SurfaceState {
                size,
                origin,
                cursor: None,
            }),
        }
    }

    /// Changes the widget size, as a window resize would.
    pub fn resize(&self, size: Size) {
        self.inner.lock().size = size;
    }

    /// Places the cursor at widget coordinates.  Positions outside the
    /// widget are stored as "not over the widget".
    pub fn set_cursor(&self, x: i32, y: i32) {
        let mut state = self.inner.lock();
        let inside = x >= 0
            && y >= 0
            && (x as i64) < i64::from(state.size.width)
            && (y as i64) < i64::from(state.size.height);
        state.cursor = inside.then_some((x, y));
    }

    /// Moves the cursor off the widget.
    pub fn clear_cursor(&self) {
        self.inner.lock().cursor = None;
    }
}

impl CaptureSurface for FixedSurface {
    fn size(&self) -> Size {
        self.inner.lock().size
    }

    fn cursor_position(&self) -> Option<(i32, i32)> {
        self.inner.lock().cursor
    }

    fn map_from_global(&self, x: i32, y: i32) -> (i32, i32) {
        let (ox, oy) = self.inner.lock().origin;
        (x.saturating_sub(ox), y.saturating_sub(oy))
    }
}
