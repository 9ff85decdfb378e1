//! Translation of canonical input events into CH9329 packets.
//!
//! The translator is the only owner of the remote primary-button state, so
//! every move and scroll report carries the correct drag bit.  It depends on
//! the [`PacketSink`] trait alone and is unit-tested against a recording sink.
//!
//! # Dispatch order for a pointer event
//!
//! 1. Map the widget position into remote coordinates.  A point on a
//!    letterbox bar discards the whole event, button and wheel included.
//! 2. A wheel event sends only the scroll report.
//! 3. Anything else sends a move (absolute, or a relative delta through the
//!    sink's move gate), then the button-down or release-all report.
//!
//! A middle-button press is the operator's "end session" gesture and is not
//! forwarded at all.

use std::sync::Arc;

use hidkvm_core::protocol::{
    encode_key_tap, encode_mouse_button, encode_mouse_move_absolute, encode_mouse_move_relative,
    encode_scroll,
};
use hidkvm_core::{
    InputEvent, KeyEvent, KeyLookup, MouseButtonState, PointerEvent, PointerGeometry, ScreenSize,
    ScrollDirection, Size,
};
use tracing::trace;

use crate::application::session_config::PointerMode;
use crate::infrastructure::transport::PacketSink;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one packet was submitted.
    Sent,
    /// The only packet was a relative move dropped by the move gate.
    Coalesced,
    /// The pointer was outside the video area, or no geometry exists.
    Discarded,
    /// Nothing to send (key release, unmapped key, zero-length move).
    Ignored,
    /// Middle-button press: the session should stop.
    StopRequested,
}

/// Stateful event → packet translator for one session.
pub struct InputTranslator {
    keymap: Arc<dyn KeyLookup>,
    pointer_mode: PointerMode,
    video: Size,
    buttons: MouseButtonState,
    last_position: Option<(u32, u32)>,
}

impl InputTranslator {
    pub fn new(keymap: Arc<dyn KeyLookup>, pointer_mode: PointerMode, video: Size) -> Self {
        Self {
            keymap,
            pointer_mode,
            video,
            buttons: MouseButtonState::new(),
            last_position: None,
        }
    }

    /// Updates the remote screen size after a video restart.
    pub fn set_video_size(&mut self, video: Size) {
        self.video = video;
        self.last_position = None;
    }

    pub fn video_size(&self) -> Size {
        self.video
    }

    pub fn button_state(&self) -> MouseButtonState {
        self.buttons
    }

    /// Translates `event` and submits the resulting packets to `sink`.
    ///
    /// `widget` is the size of the surface the event's coordinates refer to.
    pub fn translate(&mut self, event: InputEvent, widget: Size, sink: &dyn PacketSink) -> Outcome {
        match event {
            InputEvent::Key(key) => self.key(key, sink),
            InputEvent::Pointer(pointer) => self.pointer(pointer, widget, sink),
        }
    }

    fn key(&self, event: KeyEvent, sink: &dyn PacketSink) -> Outcome {
        // The device has no separate key-up report per key; a press is a tap.
        if !event.is_press {
            return Outcome::Ignored;
        }
        let Some(usage) = self.keymap.lookup(event.keycode) else {
            return Outcome::Ignored;
        };
        sink.submit_sequence(encode_key_tap(event.modifiers, usage));
        Outcome::Sent
    }

    fn pointer(&mut self, event: PointerEvent, widget: Size, sink: &dyn PacketSink) -> Outcome {
        let Some(geometry) = PointerGeometry::compute(widget, self.video) else {
            return Outcome::Discarded;
        };
        let Some((x, y)) = geometry.map_pointer(event.x, event.y) else {
            trace!(x = event.x, y = event.y, "pointer on letterbox bar");
            return Outcome::Discarded;
        };

        if event.scroll_delta != 0 {
            return match ScrollDirection::from_delta(event.scroll_delta) {
                Some(direction) => {
                    sink.submit(encode_scroll(direction, self.buttons));
                    Outcome::Sent
                }
                None => Outcome::Ignored,
            };
        }

        if event.is_press && event.button.is_middle() {
            return Outcome::StopRequested;
        }

        let moved = self.submit_move(x, y, sink);

        if event.is_press && !event.button.is_none() {
            sink.submit(encode_mouse_button(&mut self.buttons, event.button, true));
            return Outcome::Sent;
        }
        if event.is_release {
            sink.submit(encode_mouse_button(&mut self.buttons, event.button, false));
            return Outcome::Sent;
        }
        moved
    }

    fn submit_move(&mut self, x: u32, y: u32, sink: &dyn PacketSink) -> Outcome {
        match self.pointer_mode {
            PointerMode::Absolute => {
                let Ok(screen) = ScreenSize::new(self.video.width, self.video.height) else {
                    return Outcome::Discarded;
                };
                sink.submit(encode_mouse_move_absolute(x, y, screen, self.buttons));
                Outcome::Sent
            }
            PointerMode::Relative => {
                let Some((last_x, last_y)) = self.last_position else {
                    self.last_position = Some((x, y));
                    return Outcome::Ignored;
                };
                let dx = x as i32 - last_x as i32;
                let dy = y as i32 - last_y as i32;
                if dx == 0 && dy == 0 {
                    return Outcome::Ignored;
                }
                if sink.submit_move(encode_mouse_move_relative(dx, dy, self.buttons)) {
                    self.last_position = Some((x, y));
                    Outcome::Sent
                } else {
                    Outcome::Coalesced
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::recording::RecordingSink;
    use hidkvm_core::protocol::codec::{CHAR_KEY_UP_PACKET, MOUSE_BUTTON_UP_PACKET};
    use hidkvm_core::{ModifierMask, MouseButtons, UsbHidLookup};

    const WIDGET: Size = Size::new(1280, 1024);
    const VIDEO: Size = Size::new(1920, 1080);

    fn translator(mode: PointerMode) -> InputTranslator {
        InputTranslator::new(Arc::new(UsbHidLookup), mode, VIDEO)
    }

    fn pointer(event: PointerEvent) -> InputEvent {
        InputEvent::Pointer(event)
    }

    #[test]
    fn test_centre_of_letterboxed_widget_maps_to_mid_range() {
        // Arrange
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();

        // Act
        let outcome = t.translate(pointer(PointerEvent::moved(640, 512)), WIDGET, &sink);

        // Assert
        assert_eq!(outcome, Outcome::Sent);
        let packets = sink.packets();
        assert_eq!(packets.len(), 1);
        let p = &packets[0];
        assert_eq!(p[3], 0x04);
        let x = u16::from_le_bytes([p[7], p[8]]);
        let y = u16::from_le_bytes([p[9], p[10]]);
        assert!(x.abs_diff(2048) <= 1, "x = {x}");
        assert!(y.abs_diff(2048) <= 1, "y = {y}");
    }

    #[test]
    fn test_press_on_letterbox_bar_sends_nothing() {
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();

        let outcome = t.translate(
            pointer(PointerEvent::pressed(640, 100, MouseButtons::LEFT)),
            WIDGET,
            &sink,
        );

        assert_eq!(outcome, Outcome::Discarded);
        assert!(sink.packets().is_empty());
        assert_eq!(t.button_state().left_status(), 0);
    }

    #[test]
    fn test_left_press_sends_move_then_button_and_sets_drag_bit() {
        // Arrange
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();

        // Act
        t.translate(pointer(PointerEvent::pressed(640, 512, MouseButtons::LEFT)), WIDGET, &sink);
        t.translate(pointer(PointerEvent::moved(700, 512)), WIDGET, &sink);

        // Assert
        let packets = sink.packets();
        assert_eq!(sink.commands(), vec![0x04, 0x05, 0x04]);
        assert_eq!(&packets[1][5..10], &[0x01, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(packets[0][6], 0x00, "move before the press has no drag bit");
        assert_eq!(packets[2][6], 0x01, "move after the press carries the drag bit");
    }

    #[test]
    fn test_release_sends_fixed_release_all() {
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();
        t.translate(pointer(PointerEvent::pressed(640, 512, MouseButtons::LEFT)), WIDGET, &sink);
        sink.clear();

        let outcome = t.translate(
            pointer(PointerEvent::released(640, 512, MouseButtons::LEFT)),
            WIDGET,
            &sink,
        );

        assert_eq!(outcome, Outcome::Sent);
        assert_eq!(sink.packets().last().map(Vec::as_slice), Some(&MOUSE_BUTTON_UP_PACKET[..]));
        assert_eq!(t.button_state().left_status(), 0);
    }

    #[test]
    fn test_middle_press_requests_stop_without_packets() {
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();

        let outcome = t.translate(
            pointer(PointerEvent::pressed(640, 512, MouseButtons::MIDDLE)),
            WIDGET,
            &sink,
        );

        assert_eq!(outcome, Outcome::StopRequested);
        assert!(sink.packets().is_empty());
    }

    #[test]
    fn test_scroll_sends_only_wheel_report() {
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();

        t.translate(pointer(PointerEvent::scrolled(640, 512, -120)), WIDGET, &sink);

        let packets = sink.packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][5..10], &[0x01, 0x00, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn test_key_press_sends_tap_and_release_sends_nothing() {
        // Arrange
        let mut t = translator(PointerMode::Absolute);
        let sink = RecordingSink::new();
        let press = KeyEvent {
            keycode: 0x04,
            is_press: true,
            modifiers: ModifierMask(ModifierMask::CTRL),
        };
        let release = KeyEvent {
            is_press: false,
            ..press
        };

        // Act
        let pressed = t.translate(InputEvent::Key(press), WIDGET, &sink);
        let released = t.translate(InputEvent::Key(release), WIDGET, &sink);

        // Assert
        assert_eq!(pressed, Outcome::Sent);
        assert_eq!(released, Outcome::Ignored);
        assert_eq!(sink.sequence_count(), 1);
        let packets = sink.packets();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][5], 0x01);
        assert_eq!(packets[0][7], 0x04);
        assert_eq!(packets[1].as_slice(), &CHAR_KEY_UP_PACKET[..]);
    }

    #[test]
    fn test_relative_moves_are_gated_and_accumulate() {
        // Arrange
        let mut t = translator(PointerMode::Relative);
        let sink = RecordingSink::new();
        sink.hold_moves(true);

        // Act
        let first = t.translate(pointer(PointerEvent::moved(640, 512)), WIDGET, &sink);
        let second = t.translate(pointer(PointerEvent::moved(650, 512)), WIDGET, &sink);
        let third = t.translate(pointer(PointerEvent::moved(660, 512)), WIDGET, &sink);
        sink.finish_move();
        let fourth = t.translate(pointer(PointerEvent::moved(670, 512)), WIDGET, &sink);

        // Assert
        assert_eq!(first, Outcome::Ignored);
        assert_eq!(second, Outcome::Sent);
        assert_eq!(third, Outcome::Coalesced);
        assert_eq!(fourth, Outcome::Sent);
        assert_eq!(sink.stats().coalesced, 1);
        let packets = sink.packets();
        assert_eq!(packets.len(), 2);
        // 10 widget px = 15 remote px; the dropped step is folded into the next delta.
        assert_eq!(packets[0][7], 15);
        assert_eq!(packets[1][7], 30);
    }

    #[test]
    fn test_button_is_never_gated() {
        let mut t = translator(PointerMode::Relative);
        let sink = RecordingSink::new();
        sink.hold_moves(true);
        t.translate(pointer(PointerEvent::moved(640, 512)), WIDGET, &sink);
        t.translate(pointer(PointerEvent::moved(650, 512)), WIDGET, &sink);

        let outcome = t.translate(
            pointer(PointerEvent::pressed(660, 512, MouseButtons::RIGHT)),
            WIDGET,
            &sink,
        );

        assert_eq!(outcome, Outcome::Sent);
        assert_eq!(sink.commands(), vec![0x05, 0x05]);
        assert_eq!(sink.packets()[1][6], 0x02);
    }

    #[test]
    fn test_empty_video_discards_pointer() {
        let mut t = translator(PointerMode::Absolute);
        t.set_video_size(Size::new(0, 0));
        let sink = RecordingSink::new();

        let outcome = t.translate(pointer(PointerEvent::moved(10, 10)), WIDGET, &sink);

        assert_eq!(outcome, Outcome::Discarded);
        assert_eq!(t.video_size(), Size::new(0, 0));
    }
}
