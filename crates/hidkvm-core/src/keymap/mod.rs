//! Key code lookup services.
//!
//! Every capture source reports keys in its own code space.  A [`KeyLookup`]
//! turns those codes into USB HID usages (page 0x07), the only code space the
//! CH9329 understands.  `None` means "no usage for this key", and the event is
//! dropped.

pub mod hid;
pub mod windows_vk;

/// Translates a source-specific key code into a HID usage.
pub trait KeyLookup: Send + Sync {
    /// Returns the HID usage for `keycode`, or `None` if the key is unmapped.
    fn lookup(&self, keycode: u32) -> Option<u8>;
}

/// Identity lookup for sources that already report HID usages.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbHidLookup;

impl KeyLookup for UsbHidLookup {
    fn lookup(&self, keycode: u32) -> Option<u8> {
        let usage = u8::try_from(keycode).ok()?;
        hid::is_key_usage(usage).then_some(usage)
    }
}

/// Lookup for Windows virtual-key codes, as reported by low-level hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsVkLookup;

impl KeyLookup for WindowsVkLookup {
    fn lookup(&self, keycode: u32) -> Option<u8> {
        windows_vk::vk_to_hid(keycode)
    }
}
