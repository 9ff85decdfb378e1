//! CH9329 serial protocol: frame layout and report encoders.

pub mod codec;
pub mod packet;

pub use codec::{
    encode_key_down, encode_key_tap, encode_key_up_all, encode_media_key, encode_mouse_button,
    encode_mouse_move_absolute, encode_mouse_move_relative, encode_scroll, EncodeError, KeyGroup,
    KeyReport, MediaKey, MouseButtonState, ScreenSize, ScrollDirection,
};
pub use packet::{checksum, Command, DevicePacket, PacketError, PacketSequence, SequenceStep};
