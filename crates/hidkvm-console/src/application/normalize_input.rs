//! Input normalisation: raw capture events in, canonical [`InputEvent`]s out.
//!
//! # Why one normaliser per session? (for beginners)
//!
//! Keyboard and mouse hooks can fire on different OS threads.  If each of
//! them updated "which modifiers are held" directly, a Ctrl press and a key
//! press arriving at nearly the same moment could be seen in either order.
//! Instead every raw event goes through one channel, and the single thread
//! draining it owns this normaliser.  The modifier state therefore changes
//! in exactly the order the events were queued.
//!
//! Modifier keys themselves never leave the normaliser: they only update the
//! mask that is stamped onto the next ordinary key event.

use std::sync::Arc;

use hidkvm_core::keymap::hid;
use hidkvm_core::{InputEvent, KeyEvent, KeyLookup, ModifierMask, PointerEvent};
use tracing::trace;

use crate::infrastructure::input_capture::surface::CaptureSurface;
use crate::infrastructure::input_capture::{CoordinateSpace, RawInputEvent};

/// Held state of the eight physical modifier keys.
///
/// Left and right keys are tracked separately so that releasing one Shift
/// while the other is still down keeps Shift in the logical mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierTracker {
    physical: u8,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a key event.  Returns `true` if `usage` was a modifier.
    pub fn update(&mut self, usage: u8, is_press: bool) -> bool {
        let Some(bit) = hid::modifier_bit(usage) else {
            return false;
        };
        if is_press {
            self.physical |= bit;
        } else {
            self.physical &= !bit;
        }
        true
    }

    /// Logical mask with left and right folded together.
    pub fn mask(&self) -> ModifierMask {
        hid::fold_modifiers(self.physical)
    }

    /// Raw eight-bit HID modifier byte.
    pub fn physical(&self) -> u8 {
        self.physical
    }

    /// Forgets every held modifier.
    pub fn reset(&mut self) {
        self.physical = 0;
    }
}

/// Converts one source's raw events into canonical events.
pub struct InputNormalizer {
    keymap: Arc<dyn KeyLookup>,
    surface: Arc<dyn CaptureSurface>,
    space: CoordinateSpace,
    modifiers: ModifierTracker,
}

impl InputNormalizer {
    pub fn new(
        keymap: Arc<dyn KeyLookup>,
        surface: Arc<dyn CaptureSurface>,
        space: CoordinateSpace,
    ) -> Self {
        Self {
            keymap,
            surface,
            space,
            modifiers: ModifierTracker::new(),
        }
    }

    /// Currently held modifiers.
    pub fn modifiers(&self) -> ModifierMask {
        self.modifiers.mask()
    }

    /// Returns the canonical event for `raw`, or `None` if it is consumed
    /// here (modifier keys), unmapped, or carries nothing.
    pub fn normalize(&mut self, raw: RawInputEvent) -> Option<InputEvent> {
        match raw {
            RawInputEvent::KeyDown { keycode } => self.key(keycode, true),
            RawInputEvent::KeyUp { keycode } => self.key(keycode, false),
            RawInputEvent::PointerMove { x, y } => {
                let (x, y) = self.to_widget(x, y);
                Some(InputEvent::Pointer(PointerEvent::moved(x, y)))
            }
            RawInputEvent::ButtonDown { button, x, y } => {
                let (x, y) = self.to_widget(x, y);
                Some(InputEvent::Pointer(PointerEvent::pressed(x, y, button)))
            }
            RawInputEvent::ButtonUp { button, x, y } => {
                let (x, y) = self.to_widget(x, y);
                Some(InputEvent::Pointer(PointerEvent::released(x, y, button)))
            }
            RawInputEvent::Wheel { delta: 0, .. } => None,
            RawInputEvent::Wheel { delta, x, y } => {
                let (x, y) = self.to_widget(x, y);
                Some(InputEvent::Pointer(PointerEvent::scrolled(x, y, delta)))
            }
        }
    }

    fn key(&mut self, keycode: u32, is_press: bool) -> Option<InputEvent> {
        let Some(usage) = self.keymap.lookup(keycode) else {
            trace!(keycode, "unmapped key dropped");
            return None;
        };
        if self.modifiers.update(usage, is_press) {
            trace!(usage, is_press, mask = self.modifiers.physical(), "modifier");
            return None;
        }
        Some(InputEvent::Key(KeyEvent {
            keycode,
            is_press,
            modifiers: self.modifiers.mask(),
        }))
    }

    fn to_widget(&self, x: i32, y: i32) -> (i32, i32) {
        match self.space {
            CoordinateSpace::Widget => (x, y),
            CoordinateSpace::Screen => self.surface.map_from_global(x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::input_capture::surface::FixedSurface;
    use hidkvm_core::{MouseButtons, Size, UsbHidLookup, WindowsVkLookup};

    fn window_normalizer() -> InputNormalizer {
        InputNormalizer::new(
            Arc::new(UsbHidLookup),
            Arc::new(FixedSurface::new(Size::new(1280, 720))),
            CoordinateSpace::Widget,
        )
    }

    fn key_event(event: Option<InputEvent>) -> KeyEvent {
        match event {
            Some(InputEvent::Key(k)) => k,
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn test_modifier_keys_are_swallowed_and_update_mask() {
        // Arrange
        let mut n = window_normalizer();

        // Act
        let out = n.normalize(RawInputEvent::KeyDown {
            keycode: u32::from(hid::LEFT_CTRL),
        });

        // Assert
        assert!(out.is_none());
        assert!(n.modifiers().ctrl());
    }

    #[test]
    fn test_ctrl_released_before_key_release_clears_ctrl_on_key_up() {
        // Arrange
        let mut n = window_normalizer();
        let a = u32::from(hid::KEY_A);
        let ctrl = u32::from(hid::LEFT_CTRL);

        // Act
        n.normalize(RawInputEvent::KeyDown { keycode: ctrl });
        let down = key_event(n.normalize(RawInputEvent::KeyDown { keycode: a }));
        n.normalize(RawInputEvent::KeyUp { keycode: ctrl });
        let up = key_event(n.normalize(RawInputEvent::KeyUp { keycode: a }));

        // Assert
        assert!(down.is_press);
        assert!(down.modifiers.ctrl());
        assert!(!up.is_press);
        assert!(!up.modifiers.ctrl());
        assert!(n.modifiers().is_empty());
    }

    #[test]
    fn test_left_and_right_shift_fold_until_both_released() {
        let mut n = window_normalizer();

        n.normalize(RawInputEvent::KeyDown { keycode: u32::from(hid::LEFT_SHIFT) });
        n.normalize(RawInputEvent::KeyDown { keycode: u32::from(hid::RIGHT_SHIFT) });
        n.normalize(RawInputEvent::KeyUp { keycode: u32::from(hid::LEFT_SHIFT) });
        let still_held = n.modifiers().shift();
        n.normalize(RawInputEvent::KeyUp { keycode: u32::from(hid::RIGHT_SHIFT) });

        assert!(still_held);
        assert!(!n.modifiers().shift());
    }

    #[test]
    fn test_unmapped_key_is_dropped() {
        let mut n = window_normalizer();

        assert!(n.normalize(RawInputEvent::KeyDown { keycode: 0x00 }).is_none());
        assert!(n.normalize(RawInputEvent::KeyDown { keycode: 0x1234 }).is_none());
    }

    #[test]
    fn test_windows_vk_modifiers_are_recognised() {
        let mut n = InputNormalizer::new(
            Arc::new(WindowsVkLookup),
            Arc::new(FixedSurface::new(Size::new(1280, 720))),
            CoordinateSpace::Screen,
        );

        n.normalize(RawInputEvent::KeyDown { keycode: 0xA5 }); // VK_RMENU
        let c = key_event(n.normalize(RawInputEvent::KeyDown { keycode: 0x43 }));

        assert!(c.modifiers.alt());
        assert_eq!(c.keycode, 0x43);
    }

    #[test]
    fn test_screen_coordinates_are_mapped_through_surface() {
        // Arrange
        let mut n = InputNormalizer::new(
            Arc::new(WindowsVkLookup),
            Arc::new(FixedSurface::at(Size::new(1280, 720), (200, 100))),
            CoordinateSpace::Screen,
        );

        // Act
        let out = n.normalize(RawInputEvent::ButtonDown {
            button: MouseButtons::LEFT,
            x: 840,
            y: 460,
        });

        // Assert
        assert_eq!(
            out,
            Some(InputEvent::Pointer(PointerEvent::pressed(640, 360, MouseButtons::LEFT)))
        );
    }

    #[test]
    fn test_widget_coordinates_pass_through() {
        let mut n = window_normalizer();

        let out = n.normalize(RawInputEvent::PointerMove { x: 5, y: 6 });

        assert_eq!(out, Some(InputEvent::Pointer(PointerEvent::moved(5, 6))));
    }

    #[test]
    fn test_zero_wheel_delta_is_dropped() {
        let mut n = window_normalizer();

        assert!(n.normalize(RawInputEvent::Wheel { delta: 0, x: 1, y: 1 }).is_none());
        assert_eq!(
            n.normalize(RawInputEvent::Wheel { delta: -120, x: 1, y: 1 }),
            Some(InputEvent::Pointer(PointerEvent::scrolled(1, 1, -120)))
        );
    }

    #[test]
    fn test_tracker_reset_clears_everything() {
        let mut tracker = ModifierTracker::new();
        tracker.update(hid::LEFT_META, true);
        tracker.update(hid::RIGHT_ALT, true);

        tracker.reset();

        assert_eq!(tracker.physical(), 0);
        assert!(tracker.mask().is_empty());
    }
}
