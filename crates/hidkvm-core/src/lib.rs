//! # hidkvm-core
//!
//! Shared library for HidKvm containing the CH9329 command codec, the pointer
//! geometry used to map the letterboxed video area onto the remote screen,
//! the canonical input event types, and key code lookup tables.
//!
//! It has zero dependencies on OS APIs, serial ports, UI frameworks or
//! threads: everything here is a pure function of its inputs.
//!
//! # Architecture overview (for beginners)
//!
//! HidKvm lets you drive a second computer through a small USB dongle (the
//! WCH CH9329).  The dongle enumerates as a keyboard and mouse on the remote
//! machine and receives its instructions over a UART.  A capture card sends
//! the remote screen back as video.
//!
//! - **`protocol`** – How bytes travel over the serial line.  Keyboard and
//!   mouse actions are encoded into checksummed CH9329 frames
//!   (`57 AB addr cmd len data.. sum`).
//!
//! - **`domain`** – Canonical input events ([`InputEvent`]) and the
//!   [`PointerGeometry`] that maps a pointer inside the scaled video widget to
//!   an absolute position on the remote screen.
//!
//! - **`keymap`** – Translation from local key codes (Windows virtual keys,
//!   raw HID usages) to the USB HID usage IDs the dongle understands.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::geometry::{PointerGeometry, Size};
pub use domain::input::{InputEvent, KeyEvent, ModifierMask, MouseButtons, PointerEvent};
pub use keymap::{KeyLookup, UsbHidLookup, WindowsVkLookup};
pub use protocol::codec::{
    EncodeError, KeyGroup, KeyReport, MediaKey, MouseButtonState, ScreenSize, ScrollDirection,
};
pub use protocol::packet::{DevicePacket, PacketError, PacketSequence, SequenceStep};
