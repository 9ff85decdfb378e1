//! Windows Virtual-Key code to USB HID usage table.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h) and USB HID Usage
//! Tables 1.3, keyboard page 0x07.
//!
//! The low-level keyboard hook reports `KBDLLHOOKSTRUCT::vkCode`, which is a
//! *logical* key: VK_A is 0x41 whatever the physical layout.  The table is a
//! 256-entry array built at compile time, so a lookup is a single index.
//! Entries with no keyboard usage hold `0`.

use super::hid;

/// Translates a VK code to a HID usage, or `None` if it has no keyboard usage.
pub fn vk_to_hid(vk: u32) -> Option<u8> {
    let index = usize::try_from(vk).ok()?;
    match VK_TO_HID.get(index) {
        Some(&usage) if usage != 0 => Some(usage),
        _ => None,
    }
}

const VK_TO_HID: [u8; 256] = build_table();

/// Codes that do not fall into a contiguous run.
const SINGLES: &[(u8, u8)] = &[
    (0x08, hid::BACKSPACE),
    (0x09, hid::TAB),
    (0x0D, hid::ENTER),
    // Generic modifiers (some hooks report these instead of the sided codes).
    (0x10, hid::LEFT_SHIFT),
    (0x11, hid::LEFT_CTRL),
    (0x12, hid::LEFT_ALT),
    (0x13, 0x48), // Pause
    (0x14, 0x39), // CapsLock
    (0x1B, hid::ESCAPE),
    (0x20, hid::SPACE),
    (0x21, 0x4B), // PageUp
    (0x22, 0x4E), // PageDown
    (0x23, 0x4D), // End
    (0x24, 0x4A), // Home
    (0x25, 0x50), // Left
    (0x26, 0x52), // Up
    (0x27, 0x4F), // Right
    (0x28, 0x51), // Down
    (0x2C, 0x46), // PrintScreen
    (0x2D, 0x49), // Insert
    (0x2E, hid::DELETE),
    (0x30, hid::DIGIT_0),
    (0x5B, hid::LEFT_META),
    (0x5C, hid::RIGHT_META),
    (0x5D, 0x65), // Apps / context menu
    (0x60, 0x62), // Numpad 0
    (0x6A, 0x55), // Numpad *
    (0x6B, 0x57), // Numpad +
    (0x6D, 0x56), // Numpad -
    (0x6E, 0x63), // Numpad .
    (0x6F, 0x54), // Numpad /
    (0x90, 0x53), // NumLock
    (0x91, 0x47), // ScrollLock
    (0xA0, hid::LEFT_SHIFT),
    (0xA1, hid::RIGHT_SHIFT),
    (0xA2, hid::LEFT_CTRL),
    (0xA3, hid::RIGHT_CTRL),
    (0xA4, hid::LEFT_ALT),
    (0xA5, hid::RIGHT_ALT),
    (0xBA, 0x33), // ;
    (0xBB, 0x2E), // =
    (0xBC, 0x36), // ,
    (0xBD, 0x2D), // -
    (0xBE, 0x37), // .
    (0xBF, 0x38), // /
    (0xC0, 0x35), // `
    (0xDB, 0x2F), // [
    (0xDC, 0x31), // backslash
    (0xDD, 0x30), // ]
    (0xDE, 0x34), // '
    (0xE2, 0x64), // ISO extra key
];

/// `(first_vk, last_vk, first_usage)` for runs that map one-to-one.
const RUNS: &[(u8, u8, u8)] = &[
    (0x31, 0x39, hid::DIGIT_1), // 1..9
    (0x41, 0x5A, hid::KEY_A),   // A..Z
    (0x61, 0x69, 0x59),         // Numpad 1..9
    (0x70, 0x7B, hid::F1),      // F1..F12
    (0x7C, 0x87, 0x68),         // F13..F24
];

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];

    let mut r = 0;
    while r < RUNS.len() {
        let (first, last, usage) = RUNS[r];
        let mut vk = first;
        while vk <= last {
            table[vk as usize] = usage + (vk - first);
            vk += 1;
        }
        r += 1;
    }

    let mut s = 0;
    while s < SINGLES.len() {
        let (vk, usage) = SINGLES[s];
        table[vk as usize] = usage;
        s += 1;
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_map_to_contiguous_usages() {
        for (i, vk) in (0x41u32..=0x5A).enumerate() {
            assert_eq!(vk_to_hid(vk), Some(hid::KEY_A + i as u8), "VK 0x{vk:02X}");
        }
    }

    #[test]
    fn test_digit_row_wraps_zero_to_the_end() {
        assert_eq!(vk_to_hid(0x31), Some(hid::DIGIT_1));
        assert_eq!(vk_to_hid(0x39), Some(0x26));
        assert_eq!(vk_to_hid(0x30), Some(hid::DIGIT_0));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(vk_to_hid(0x70), Some(hid::F1));
        assert_eq!(vk_to_hid(0x7B), Some(hid::F12));
        assert_eq!(vk_to_hid(0x7C), Some(0x68));
        assert_eq!(vk_to_hid(0x87), Some(0x73));
    }

    #[test]
    fn test_sided_and_generic_modifiers_map_to_modifier_usages() {
        for vk in [0x10u32, 0x11, 0x12, 0x5B, 0x5C, 0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5] {
            let usage = vk_to_hid(vk).expect("modifier VK must map");
            assert!(hid::is_modifier(usage), "VK 0x{vk:02X} -> 0x{usage:02X}");
        }
        assert_eq!(vk_to_hid(0xA3), Some(hid::RIGHT_CTRL));
    }

    #[test]
    fn test_mouse_and_undefined_vks_are_unmapped() {
        for vk in [0x00u32, 0x01, 0x02, 0x04, 0x05, 0x06, 0x07, 0x0A, 0xFF] {
            assert_eq!(vk_to_hid(vk), None, "VK 0x{vk:02X}");
        }
    }

    #[test]
    fn test_out_of_range_codes_are_unmapped() {
        assert_eq!(vk_to_hid(0x100), None);
        assert_eq!(vk_to_hid(u32::MAX), None);
    }

    #[test]
    fn test_every_mapped_entry_is_a_valid_key_usage() {
        for vk in 0u32..=255 {
            if let Some(usage) = vk_to_hid(vk) {
                assert!(hid::is_key_usage(usage), "VK 0x{vk:02X} -> 0x{usage:02X}");
            }
        }
    }
}
