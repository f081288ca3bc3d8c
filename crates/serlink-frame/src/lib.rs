//! HDLC-style framing for serial links.
//!
//! Every frame on the wire looks like:
//! - an opening `0x7E` flag
//! - address and control bytes, payload, CRC16-CCITT (little-endian)
//! - a closing `0x7E` flag
//!
//! Everything between the flags is byte-stuffed so the flag value never
//! appears inside a frame. [`FrameDecoder`] recovers frames from a noisy
//! byte stream one byte at a time and discards anything that fails the CRC.

pub mod codec;
pub mod control;
pub mod crc;
pub mod error;

pub use codec::{
    encode_frame, parse_frame, stuff, stuff_byte, unstuff, Frame, FrameConfig, FrameDecoder,
    DEFAULT_ADDRESS, DEFAULT_MAX_FRAME_SIZE, ESCAPE, ESCAPE_XOR, FLAG, MIN_FRAME_SIZE,
};
pub use control::{Control, SupervisoryKind, UnnumberedKind, SEQ_MODULUS};
pub use self::crc::{crc16, Crc16, CRC_16};
pub use error::{FrameError, Result};
