//! Encoders for every keyboard and mouse report the console sends.
//!
//! All functions here are pure: they take values and return a
//! [`DevicePacket`] (or a [`PacketSequence`] for taps).  Validation happens
//! when the input values are constructed ([`KeyReport::new`],
//! [`ScreenSize::new`], [`ScrollDirection::from_delta`]), so the encoders
//! themselves cannot fail.
//!
//! Payload layouts:
//! ```text
//! CHAR_KEY  (0x02, len 8): [modifier][0x00][k1][k2][k3][k4][k5][k6]
//! MEDIA     (0x03, len 4): [0x02][b1][b2][b3]
//! MS_ABS    (0x04, len 7): [0x02][buttons][x_lo][x_hi][y_lo][y_hi][wheel]
//! MS_REL    (0x05, len 5): [0x01][buttons][dx][dy][wheel]
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::domain::input::{ModifierMask, MouseButtons};
use crate::protocol::packet::{Command, DevicePacket, PacketSequence};

/// Maximum simultaneous non-modifier keys in one keyboard report.
pub const MAX_KEYS: usize = 6;

/// Absolute coordinates are normalised onto `0..ABS_RESOLUTION`.
pub const ABS_RESOLUTION: u32 = 4096;

/// Pause between a key-down and its release inside a tap.
pub const KEY_TAP_SETTLE: Duration = Duration::from_millis(20);

/// `57 AB 00 02 08 00 00 00 00 00 00 00 00 0C`
pub const CHAR_KEY_UP_PACKET: [u8; 14] = [
    0x57, 0xAB, 0x00, 0x02, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0C,
];

/// `57 AB 00 03 04 02 00 00 00 0B`
pub const MEDIA_KEY_UP_PACKET: [u8; 10] = [0x57, 0xAB, 0x00, 0x03, 0x04, 0x02, 0x00, 0x00, 0x00, 0x0B];

/// `57 AB 00 05 05 01 00 00 00 00 0D`
pub const MOUSE_BUTTON_UP_PACKET: [u8; 11] =
    [0x57, 0xAB, 0x00, 0x05, 0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x0D];

const REL_REPORT_ID: u8 = 0x01;
const ABS_REPORT_ID: u8 = 0x02;
const MEDIA_REPORT_ID: u8 = 0x02;

/// Errors raised when a report value cannot be represented on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// More than [`MAX_KEYS`] keys in one keyboard report.
    #[error("too many keys in one report: {0} (max {MAX_KEYS})")]
    TooManyKeys(usize),

    /// Screen size with a zero dimension.
    #[error("invalid screen size {width}x{height}")]
    InvalidScreenSize { width: u32, height: u32 },
}

// ── Value types ──────────────────────────────────────────────────────────────

/// Which keyboard report a release-all applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyGroup {
    /// Standard keyboard.
    Char,
    /// Consumer/multimedia keys.
    Media,
}

/// A validated standard keyboard report: modifier byte plus up to six keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyReport {
    modifier: u8,
    keys: [u8; MAX_KEYS],
}

impl KeyReport {
    /// Builds a report from a HID modifier byte and key usages.
    ///
    /// # Errors
    ///
    /// [`EncodeError::TooManyKeys`] if `keys` has more than six entries.
    pub fn new(modifier: u8, keys: &[u8]) -> Result<Self, EncodeError> {
        if keys.len() > MAX_KEYS {
            return Err(EncodeError::TooManyKeys(keys.len()));
        }
        let mut padded = [0u8; MAX_KEYS];
        padded[..keys.len()].copy_from_slice(keys);
        Ok(Self {
            modifier,
            keys: padded,
        })
    }

    /// One key with the given logical modifiers.
    pub fn single(modifiers: ModifierMask, usage: u8) -> Self {
        let mut keys = [0u8; MAX_KEYS];
        keys[0] = usage;
        Self {
            modifier: modifiers.hid_byte(),
            keys,
        }
    }

    pub fn modifier(&self) -> u8 {
        self.modifier
    }

    pub fn keys(&self) -> &[u8; MAX_KEYS] {
        &self.keys
    }
}

/// Remote screen size used to normalise absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    width: u32,
    height: u32,
}

impl ScreenSize {
    /// # Errors
    ///
    /// [`EncodeError::InvalidScreenSize`] if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidScreenSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// One wheel notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Sign of `delta` as a direction; zero has none.
    pub fn from_delta(delta: i32) -> Option<Self> {
        match delta.signum() {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }

    fn wheel_byte(self) -> u8 {
        match self {
            Self::Up => 0x01,
            Self::Down => (-1i8) as u8,
        }
    }
}

/// Multimedia keys the CH9329 exposes through its consumer report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKey {
    Eject,
    CdStop,
    PrevTrack,
    NextTrack,
    PlayPause,
    Mute,
    VolumeDown,
    VolumeUp,
}

impl MediaKey {
    /// The three data bytes following the media report id.
    pub fn bytes(self) -> [u8; 3] {
        let b1 = match self {
            Self::Eject => 0x80,
            Self::CdStop => 0x40,
            Self::PrevTrack => 0x20,
            Self::NextTrack => 0x10,
            Self::PlayPause => 0x08,
            Self::Mute => 0x04,
            Self::VolumeDown => 0x02,
            Self::VolumeUp => 0x01,
        };
        [b1, 0x00, 0x00]
    }

    /// Parses a lowercase name such as `"volume-up"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "eject" => Some(Self::Eject),
            "cd-stop" | "stop" => Some(Self::CdStop),
            "prev-track" | "prev" => Some(Self::PrevTrack),
            "next-track" | "next" => Some(Self::NextTrack),
            "play-pause" | "play" => Some(Self::PlayPause),
            "mute" => Some(Self::Mute),
            "volume-down" => Some(Self::VolumeDown),
            "volume-up" => Some(Self::VolumeUp),
            _ => None,
        }
    }
}

/// The primary-button byte carried in every mouse report.
///
/// Only the button encoder changes it: a primary press sets it, any release
/// clears it.  Move and scroll reports read it so that dragging keeps the
/// button held on the remote side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseButtonState {
    left_status: u8,
}

impl MouseButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `1` while the primary button is held, else `0`.
    pub fn left_status(&self) -> u8 {
        self.left_status
    }
}

// ── Encoders ─────────────────────────────────────────────────────────────────

/// Keyboard report with the given keys held.
pub fn encode_key_down(report: &KeyReport) -> DevicePacket {
    let mut data = [0u8; 8];
    data[0] = report.modifier;
    data[2..].copy_from_slice(&report.keys);
    DevicePacket::assemble(Command::CharKey.code(), &data)
}

/// Releases every key in `group`.
pub fn encode_key_up_all(group: KeyGroup) -> DevicePacket {
    match group {
        KeyGroup::Char => DevicePacket::from_static(&CHAR_KEY_UP_PACKET),
        KeyGroup::Media => DevicePacket::from_static(&MEDIA_KEY_UP_PACKET),
    }
}

/// Press, settle, release-all for one key with the given modifiers.
pub fn encode_key_tap(modifiers: ModifierMask, usage: u8) -> PacketSequence {
    PacketSequence::new()
        .then(encode_key_down(&KeyReport::single(modifiers, usage)))
        .settle(KEY_TAP_SETTLE)
        .then(encode_key_up_all(KeyGroup::Char))
}

/// Relative mouse motion.  Deltas saturate to the signed byte range.
pub fn encode_mouse_move_relative(dx: i32, dy: i32, buttons: MouseButtonState) -> DevicePacket {
    let data = [
        REL_REPORT_ID,
        buttons.left_status,
        clamp_delta(dx),
        clamp_delta(dy),
        0x00,
    ];
    DevicePacket::assemble(Command::MouseRelative.code(), &data)
}

/// Absolute mouse position in remote screen pixels.
pub fn encode_mouse_move_absolute(
    x: u32,
    y: u32,
    screen: ScreenSize,
    buttons: MouseButtonState,
) -> DevicePacket {
    let [x_lo, x_hi] = normalise_abs(x, screen.width).to_le_bytes();
    let [y_lo, y_hi] = normalise_abs(y, screen.height).to_le_bytes();
    let data = [ABS_REPORT_ID, buttons.left_status, x_lo, x_hi, y_lo, y_hi, 0x00];
    DevicePacket::assemble(Command::MouseAbsolute.code(), &data)
}

/// Button press or release.
///
/// A press reports the pressed button mask; pressing the primary button also
/// marks it held in `state`.  Any release sends the fixed release-all report
/// and clears `state`.
pub fn encode_mouse_button(
    state: &mut MouseButtonState,
    button: MouseButtons,
    is_down: bool,
) -> DevicePacket {
    if !is_down {
        state.left_status = 0;
        return DevicePacket::from_static(&MOUSE_BUTTON_UP_PACKET);
    }

    if button.is_primary() {
        state.left_status = 1;
    }
    let data = [REL_REPORT_ID, button.0, 0x00, 0x00, 0x00];
    DevicePacket::assemble(Command::MouseRelative.code(), &data)
}

/// One wheel notch, keeping the primary button state.
pub fn encode_scroll(direction: ScrollDirection, buttons: MouseButtonState) -> DevicePacket {
    let data = [
        REL_REPORT_ID,
        buttons.left_status,
        0x00,
        0x00,
        direction.wheel_byte(),
    ];
    DevicePacket::assemble(Command::MouseRelative.code(), &data)
}

/// Media key press followed by media release-all.
pub fn encode_media_key(key: MediaKey) -> PacketSequence {
    let [b1, b2, b3] = key.bytes();
    let down = DevicePacket::assemble(Command::MediaKey.code(), &[MEDIA_REPORT_ID, b1, b2, b3]);
    PacketSequence::new()
        .then(down)
        .settle(KEY_TAP_SETTLE)
        .then(encode_key_up_all(KeyGroup::Media))
}

fn clamp_delta(delta: i32) -> u8 {
    delta.clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8
}

fn normalise_abs(value: u32, extent: u32) -> u16 {
    let scaled = u64::from(value) * u64::from(ABS_RESOLUTION) / u64::from(extent);
    scaled.min(u64::from(ABS_RESOLUTION - 1)) as u16
}
