//! CH9329 frame layout.
//!
//! ```text
//! [0x57][0xAB][addr:1][cmd:1][len:1][data:len][sum:1]
//! ```
//!
//! `sum` is the low byte of the sum of every preceding byte, header included.
//! Multi-byte fields inside `data` are little-endian.
//!
//! # Why is a packet never cloned? (for beginners)
//!
//! [`DevicePacket`] deliberately does not implement `Clone`.  A packet is
//! built once by the codec and *moved* into the transport, which writes it
//! and drops it.  Because the compiler refuses to let you use a moved value
//! again, the same keystroke can never be queued twice by accident.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Frame header bytes.
pub const HEADER: [u8; 2] = [0x57, 0xAB];

/// Default chip address.  Every packet built by this crate uses it.
pub const DEFAULT_ADDRESS: u8 = 0x00;

/// Largest payload the chip accepts in one frame.
pub const MAX_PAYLOAD: usize = 64;

/// header(2) + addr(1) + cmd(1) + len(1)
const PREFIX_LEN: usize = 5;

/// Reply frames carry `cmd | 0x80` on success and `cmd | 0xC0` on failure.
pub const REPLY_SUCCESS_MASK: u8 = 0x80;
pub const REPLY_ERROR_MASK: u8 = 0xC0;

/// Command codes understood by the CH9329.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Chip version and lock-key status.  Declared only; nothing encodes it.
    GetInfo = 0x01,
    /// Standard keyboard report (`SEND_KB_GENERAL_DATA`).
    CharKey = 0x02,
    /// Multimedia keyboard report (`SEND_KB_MEDIA_DATA`).
    MediaKey = 0x03,
    /// Absolute mouse report (`SEND_MS_ABS_DATA`).
    MouseAbsolute = 0x04,
    /// Relative mouse report (`SEND_MS_REL_DATA`).
    MouseRelative = 0x05,
    /// Read parameter configuration.  Declared only.
    GetParaCfg = 0x08,
    /// Read USB string descriptors.  Declared only.
    GetUsbString = 0x0A,
    /// Custom HID data.  Declared only; the chip's reply carries
    /// `0x07 | REPLY_SUCCESS_MASK`.
    ReadMyHidData = 0x07,
}

impl Command {
    /// Converts a raw command byte (request form, not reply form).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::GetInfo),
            0x02 => Some(Self::CharKey),
            0x03 => Some(Self::MediaKey),
            0x04 => Some(Self::MouseAbsolute),
            0x05 => Some(Self::MouseRelative),
            0x07 => Some(Self::ReadMyHidData),
            0x08 => Some(Self::GetParaCfg),
            0x0A => Some(Self::GetUsbString),
            _ => None,
        }
    }

    /// Returns the wire byte.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors raised while building or parsing a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the smallest possible frame.
    #[error("frame too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    /// The first two bytes are not `57 AB`.
    #[error("bad frame header: {0:02X} {1:02X}")]
    BadHeader(u8, u8),

    /// Declared payload length disagrees with the buffer.
    #[error("frame length mismatch: header says {declared}, available is {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// Payload exceeds [`MAX_PAYLOAD`].
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLong(usize),

    /// Trailing checksum does not match the frame contents.
    #[error("checksum mismatch: frame carries {found:02X}, computed {computed:02X}")]
    ChecksumMismatch { found: u8, computed: u8 },
}

/// Additive checksum: low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// One complete, checksummed CH9329 frame.
#[derive(PartialEq, Eq)]
pub struct DevicePacket {
    bytes: Vec<u8>,
}

impl DevicePacket {
    /// Builds a frame for `command` with the given payload.
    ///
    /// # Errors
    ///
    /// [`PacketError::PayloadTooLong`] if `data` exceeds [`MAX_PAYLOAD`].
    pub fn new(command: u8, data: &[u8]) -> Result<Self, PacketError> {
        if data.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLong(data.len()));
        }
        Ok(Self::assemble(command, data))
    }

    /// Infallible builder for the codec, whose payloads are at most 8 bytes.
    pub(crate) fn assemble(command: u8, data: &[u8]) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD);
        let mut bytes = Vec::with_capacity(PREFIX_LEN + data.len() + 1);
        bytes.extend_from_slice(&HEADER);
        bytes.push(DEFAULT_ADDRESS);
        bytes.push(command);
        bytes.push(data.len() as u8);
        bytes.extend_from_slice(data);
        bytes.push(checksum(&bytes));
        Self { bytes }
    }

    /// Wraps a fixed, pre-computed frame.
    pub(crate) fn from_static(frame: &[u8]) -> Self {
        Self {
            bytes: frame.to_vec(),
        }
    }

    /// Parses and validates one frame from the start of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied, so a caller
    /// reading a stream can advance past it.
    ///
    /// # Errors
    ///
    /// Any [`PacketError`] other than `PayloadTooLong`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        if buf.len() < PREFIX_LEN + 1 {
            return Err(PacketError::TooShort {
                needed: PREFIX_LEN + 1,
                available: buf.len(),
            });
        }
        if buf[..2] != HEADER {
            return Err(PacketError::BadHeader(buf[0], buf[1]));
        }

        let declared = buf[4] as usize;
        let total = PREFIX_LEN + declared + 1;
        if buf.len() < total {
            return Err(PacketError::LengthMismatch {
                declared,
                available: buf.len() - PREFIX_LEN - 1,
            });
        }

        let found = buf[total - 1];
        let computed = checksum(&buf[..total - 1]);
        if found != computed {
            return Err(PacketError::ChecksumMismatch { found, computed });
        }

        Ok((
            Self {
                bytes: buf[..total].to_vec(),
            },
            total,
        ))
    }

    /// Full frame including header and checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the packet, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn address(&self) -> u8 {
        self.bytes[2]
    }

    /// Raw command byte (may carry a reply mask).
    pub fn command(&self) -> u8 {
        self.bytes[3]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[PREFIX_LEN..self.bytes.len() - 1]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Recomputes the checksum and compares it with the trailing byte.
    pub fn verify_checksum(&self) -> bool {
        checksum(&self.bytes[..self.bytes.len() - 1]) == self.checksum()
    }

    /// Returns `true` if this is a device reply reporting failure.
    pub fn is_error_reply(&self) -> bool {
        self.command() & REPLY_ERROR_MASK == REPLY_ERROR_MASK
    }

    /// Returns `true` if this is a successful device reply.
    pub fn is_success_reply(&self) -> bool {
        self.command() & REPLY_ERROR_MASK == REPLY_SUCCESS_MASK
    }

    /// Number of bytes on the wire.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for DevicePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DevicePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePacket[{self}]")
    }
}

// ── Sequences ────────────────────────────────────────────────────────────────

/// One step the transport writer executes.
#[derive(Debug, PartialEq, Eq)]
pub enum SequenceStep {
    /// Write this frame.
    Packet(DevicePacket),
    /// Wait before the next step, so the host registers the previous report.
    Settle(Duration),
}

/// Ordered packets and pauses that must reach the wire as one unit.
///
/// A key tap is the typical case: down report, short settle, release report.
/// The transport queues the whole sequence as a single job so nothing else
/// can be interleaved between the press and its release.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PacketSequence {
    steps: Vec<SequenceStep>,
}

impl PacketSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame.
    pub fn then(mut self, packet: DevicePacket) -> Self {
        self.steps.push(SequenceStep::Packet(packet));
        self
    }

    /// Appends a pause.
    pub fn settle(mut self, duration: Duration) -> Self {
        self.steps.push(SequenceStep::Settle(duration));
        self
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<SequenceStep> {
        self.steps
    }

    /// Iterates over the frames only, skipping settle steps.
    pub fn packets(&self) -> impl Iterator<Item = &DevicePacket> {
        self.steps.iter().filter_map(|step| match step {
            SequenceStep::Packet(p) => Some(p),
            SequenceStep::Settle(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<DevicePacket> for PacketSequence {
    fn from(packet: DevicePacket) -> Self {
        Self::new().then(packet)
    }
}
