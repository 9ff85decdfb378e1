//! Canonical input events.
//!
//! Window-scoped capture and OS-level hooks report input in different shapes.
//! Both are normalised into [`InputEvent`] before anything downstream sees
//! them, so the translator and the session controller only ever handle one
//! event type.

use serde::{Deserialize, Serialize};

/// Set of logical modifier keys currently held: {ctrl, shift, alt, meta}.
///
/// Left and right variants are folded together.  The bit layout matches the
/// left-hand half of the USB HID modifier byte, so [`ModifierMask::hid_byte`]
/// can be placed straight into a keyboard report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierMask(pub u8);

impl ModifierMask {
    pub const CTRL: u8 = 1 << 0;
    pub const SHIFT: u8 = 1 << 1;
    pub const ALT: u8 = 1 << 2;
    pub const META: u8 = 1 << 3;

    /// The empty mask.
    pub const NONE: ModifierMask = ModifierMask(0);

    /// Returns `true` if Ctrl is held.
    pub fn ctrl(self) -> bool {
        self.0 & Self::CTRL != 0
    }

    /// Returns `true` if Shift is held.
    pub fn shift(self) -> bool {
        self.0 & Self::SHIFT != 0
    }

    /// Returns `true` if Alt is held.
    pub fn alt(self) -> bool {
        self.0 & Self::ALT != 0
    }

    /// Returns `true` if Meta (Win/Cmd/Super) is held.
    pub fn meta(self) -> bool {
        self.0 & Self::META != 0
    }

    /// Returns `true` if no modifier is held.
    pub fn is_empty(self) -> bool {
        self.0 & 0x0F == 0
    }

    /// HID keyboard report modifier byte for this mask.
    pub fn hid_byte(self) -> u8 {
        self.0 & 0x0F
    }
}

/// Mouse button bit set as used on the CH9329 wire (bit 0 = primary).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButtons(pub u8);

impl MouseButtons {
    pub const LEFT: MouseButtons = MouseButtons(0x01);
    pub const RIGHT: MouseButtons = MouseButtons(0x02);
    pub const MIDDLE: MouseButtons = MouseButtons(0x04);
    pub const NONE: MouseButtons = MouseButtons(0x00);

    /// Returns `true` if the primary (left) button bit is set.
    pub fn is_primary(self) -> bool {
        self.0 & Self::LEFT.0 != 0
    }

    /// Returns `true` if the middle button bit is set.
    pub fn is_middle(self) -> bool {
        self.0 & Self::MIDDLE.0 != 0
    }

    /// Returns `true` if no button bit is set.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A key press or release, already stripped of modifier key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key code in the capture source's own code space (see `keymap`).
    pub keycode: u32,
    /// `true` for press, `false` for release.
    pub is_press: bool,
    /// Modifiers held at the moment this event was observed.
    pub modifiers: ModifierMask,
}

/// Pointer movement, button or wheel activity in widget pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// X in widget pixels (may be negative or beyond the widget).
    pub x: i32,
    /// Y in widget pixels.
    pub y: i32,
    /// Button involved in a press; [`MouseButtons::NONE`] for moves and wheel.
    pub button: MouseButtons,
    pub is_press: bool,
    pub is_release: bool,
    /// Wheel delta; only its sign is meaningful downstream.
    pub scroll_delta: i32,
}

impl PointerEvent {
    /// A plain pointer move.
    pub fn moved(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// A button press at (x, y).
    pub fn pressed(x: i32, y: i32, button: MouseButtons) -> Self {
        Self {
            x,
            y,
            button,
            is_press: true,
            ..Self::default()
        }
    }

    /// A button release at (x, y).
    pub fn released(x: i32, y: i32, button: MouseButtons) -> Self {
        Self {
            x,
            y,
            button,
            is_release: true,
            ..Self::default()
        }
    }

    /// A wheel notch at (x, y).
    pub fn scrolled(x: i32, y: i32, delta: i32) -> Self {
        Self {
            x,
            y,
            scroll_delta: delta,
            ..Self::default()
        }
    }

    /// Returns `true` if this event carries neither button nor wheel activity.
    pub fn is_move(&self) -> bool {
        !self.is_press && !self.is_release && self.scroll_delta == 0
    }
}

/// The single event type produced by the input normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    Key(KeyEvent),
    Pointer(PointerEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_mask_accessors_read_individual_bits() {
        let mask = ModifierMask(ModifierMask::CTRL | ModifierMask::ALT);

        assert!(mask.ctrl());
        assert!(!mask.shift());
        assert!(mask.alt());
        assert!(!mask.meta());
        assert!(!mask.is_empty());
    }

    #[test]
    fn test_modifier_mask_hid_byte_matches_left_hand_hid_bits() {
        // HID: LeftCtrl=0x01, LeftShift=0x02, LeftAlt=0x04, LeftGui=0x08
        let all = ModifierMask(0x0F);
        assert_eq!(all.hid_byte(), 0x0F);
        assert_eq!(ModifierMask(ModifierMask::SHIFT).hid_byte(), 0x02);
    }

    #[test]
    fn test_pointer_event_constructors_set_flags() {
        assert!(PointerEvent::moved(1, 2).is_move());

        let press = PointerEvent::pressed(5, 6, MouseButtons::LEFT);
        assert!(press.is_press && !press.is_release);
        assert!(press.button.is_primary());

        let release = PointerEvent::released(5, 6, MouseButtons::LEFT);
        assert!(release.is_release && !release.is_press);

        let wheel = PointerEvent::scrolled(0, 0, -120);
        assert!(!wheel.is_move());
        assert_eq!(wheel.scroll_delta, -120);
    }

    #[test]
    fn test_mouse_buttons_middle_is_not_primary() {
        assert!(MouseButtons::MIDDLE.is_middle());
        assert!(!MouseButtons::MIDDLE.is_primary());
        assert!(MouseButtons::NONE.is_none());
    }
}
