//! USB HID Usage IDs (page 0x07, Keyboard/Keypad).
//!
//! The CH9329 speaks raw HID usages: a keyboard report carries a modifier
//! byte plus up to six usage bytes.  Everything the console captures is
//! reduced to these values before it is encoded.
//!
//! # Modifier usages (for beginners)
//!
//! The eight modifier keys have usages `0xE0..=0xE7`, but they never appear
//! in the six key slots of a report.  Instead each one owns a bit of the
//! modifier byte, in the same order:
//!
//! | Usage | Key         | Bit  |
//! |-------|-------------|------|
//! | 0xE0  | Left Ctrl   | 0x01 |
//! | 0xE1  | Left Shift  | 0x02 |
//! | 0xE2  | Left Alt    | 0x04 |
//! | 0xE3  | Left Meta   | 0x08 |
//! | 0xE4  | Right Ctrl  | 0x10 |
//! | 0xE5  | Right Shift | 0x20 |
//! | 0xE6  | Right Alt   | 0x40 |
//! | 0xE7  | Right Meta  | 0x80 |

use crate::domain::input::ModifierMask;

pub const KEY_A: u8 = 0x04;
pub const KEY_C: u8 = 0x06;
pub const KEY_Z: u8 = 0x1D;
pub const DIGIT_1: u8 = 0x1E;
pub const DIGIT_0: u8 = 0x27;
pub const ENTER: u8 = 0x28;
pub const ESCAPE: u8 = 0x29;
pub const BACKSPACE: u8 = 0x2A;
pub const TAB: u8 = 0x2B;
pub const SPACE: u8 = 0x2C;
pub const F1: u8 = 0x3A;
pub const F12: u8 = 0x45;
pub const DELETE: u8 = 0x4C;

pub const LEFT_CTRL: u8 = 0xE0;
pub const LEFT_SHIFT: u8 = 0xE1;
pub const LEFT_ALT: u8 = 0xE2;
pub const LEFT_META: u8 = 0xE3;
pub const RIGHT_CTRL: u8 = 0xE4;
pub const RIGHT_SHIFT: u8 = 0xE5;
pub const RIGHT_ALT: u8 = 0xE6;
pub const RIGHT_META: u8 = 0xE7;

/// Lowest usage that is an actual key (0x00–0x03 are error/reserved codes).
pub const FIRST_KEY_USAGE: u8 = 0x04;
/// Highest usage on the keyboard page that the chip accepts.
pub const LAST_KEY_USAGE: u8 = RIGHT_META;

/// Returns `true` if `usage` names a real key.
pub fn is_key_usage(usage: u8) -> bool {
    (FIRST_KEY_USAGE..=LAST_KEY_USAGE).contains(&usage)
}

/// Returns `true` if `usage` is one of the eight modifier keys.
pub fn is_modifier(usage: u8) -> bool {
    (LEFT_CTRL..=RIGHT_META).contains(&usage)
}

/// Bit this modifier occupies in the report's modifier byte.
pub fn modifier_bit(usage: u8) -> Option<u8> {
    is_modifier(usage).then(|| 1u8 << (usage - LEFT_CTRL))
}

/// Folds an eight-bit physical modifier byte into the logical mask.
///
/// Right-hand bits are merged onto their left-hand counterparts.
pub fn fold_modifiers(physical: u8) -> ModifierMask {
    ModifierMask((physical | (physical >> 4)) & 0x0F)
}
