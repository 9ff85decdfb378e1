//! Mapping from the scaled video widget to remote screen coordinates.
//!
//! The captured video is drawn aspect-preserved inside a widget of arbitrary
//! size, leaving black bars either left/right (pillarbox) or top/bottom
//! (letterbox).  A pointer position in widget pixels therefore has to be
//! shifted by the bar offset and rescaled before it means anything on the
//! remote machine.  Positions that land on a bar are not on the remote
//! screen at all and map to `None`.

use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Geometry of one frame of the video widget, computed per pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerGeometry {
    /// Full widget size on the operator's screen.
    pub widget: Size,
    /// Area of the widget actually covered by video.
    pub display: Size,
    /// Left bar width.
    pub offset_x: u32,
    /// Top bar height.
    pub offset_y: u32,
    /// Remote screen size (the video's native resolution).
    pub video: Size,
}

impl PointerGeometry {
    /// Computes the aspect-preserving display rectangle for `video` inside
    /// `widget`.
    ///
    /// Returns `None` when either size is empty, since no mapping exists.
    pub fn compute(widget: Size, video: Size) -> Option<Self> {
        if widget.is_empty() || video.is_empty() {
            return None;
        }

        let video_aspect = video.width as f64 / video.height as f64;
        let widget_aspect = widget.width as f64 / widget.height as f64;

        let (display, offset_x, offset_y) = if widget_aspect > video_aspect {
            // Widget is wider than the video: bars on the left and right.
            let display_w = (widget.height as f64 * video_aspect).round() as u32;
            let display_w = display_w.min(widget.width);
            (
                Size::new(display_w, widget.height),
                (widget.width - display_w) / 2,
                0,
            )
        } else {
            let display_h = (widget.width as f64 / video_aspect).round() as u32;
            let display_h = display_h.min(widget.height);
            (
                Size::new(widget.width, display_h),
                0,
                (widget.height - display_h) / 2,
            )
        };

        if display.is_empty() {
            return None;
        }

        Some(Self {
            widget,
            display,
            offset_x,
            offset_y,
            video,
        })
    }

    /// Maps a widget-space point to remote video pixels.
    ///
    /// The display rectangle is treated as closed on both ends, so the far
    /// edge maps to exactly `video.width` / `video.height`.  Anything on a
    /// bar or outside the widget yields `None`.
    pub fn map_pointer(&self, px: i32, py: i32) -> Option<(u32, u32)> {
        let local_x = i64::from(px) - i64::from(self.offset_x);
        let local_y = i64::from(py) - i64::from(self.offset_y);

        if local_x < 0
            || local_y < 0
            || local_x > i64::from(self.display.width)
            || local_y > i64::from(self.display.height)
        {
            return None;
        }

        let x = (local_x as f64 / self.display.width as f64 * self.video.width as f64).floor();
        let y = (local_y as f64 / self.display.height as f64 * self.video.height as f64).floor();

        Some((x as u32, y as u32))
    }

    /// Returns `true` if `(px, py)` falls on the video rather than a bar.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        self.map_pointer(px, py).is_some()
    }
}
