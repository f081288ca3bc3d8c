use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::control::Control;
use crate::crc::{crc16, Crc16};
use crate::error::{FrameError, Result};

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;

/// Escape prefix for stuffed bytes.
pub const ESCAPE: u8 = 0x7D;

/// Value XOR-ed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Address + control + CRC.
pub const MIN_FRAME_SIZE: usize = 4;

/// Default station address. Not used for routing.
pub const DEFAULT_ADDRESS: u8 = 0xFF;

/// Default maximum unstuffed frame size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum unstuffed frame size in bytes (address through CRC). Default: 1024.
    pub max_frame_size: usize,
    /// Also escape bytes below 0x20 on transmit. Receivers decode either form.
    pub escape_control_chars: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            escape_control_chars: false,
        }
    }
}

/// A validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub control: Control,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(control: Control, payload: impl Into<Bytes>) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            control,
            payload: payload.into(),
        }
    }

    /// Unstuffed size on the wire (address + control + payload + CRC).
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }
}

#[inline]
fn needs_escape(byte: u8, escape_control_chars: bool) -> bool {
    byte == FLAG || byte == ESCAPE || (escape_control_chars && byte < 0x20)
}

/// Append `byte` to `dst`, escaping it if required.
#[inline]
pub fn stuff_byte(byte: u8, escape_control_chars: bool, dst: &mut BytesMut) {
    if needs_escape(byte, escape_control_chars) {
        dst.put_u8(ESCAPE);
        dst.put_u8(byte ^ ESCAPE_XOR);
    } else {
        dst.put_u8(byte);
    }
}

/// Byte-stuff `data` into `dst`. Flags are never emitted.
pub fn stuff(data: &[u8], escape_control_chars: bool, dst: &mut BytesMut) {
    dst.reserve(data.len());
    for &b in data {
        stuff_byte(b, escape_control_chars, dst);
    }
}

/// Reverse [`stuff`].
pub fn unstuff(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut escaping = false;
    for &b in data {
        if escaping {
            out.push(b ^ ESCAPE_XOR);
            escaping = false;
        } else if b == ESCAPE {
            escaping = true;
        } else {
            out.push(b);
        }
    }
    if escaping {
        return Err(FrameError::DanglingEscape);
    }
    Ok(out)
}

/// Encode a complete frame, including both flags, into `dst`.
///
/// Wire format:
/// ```text
/// 0x7E <address> <control> <payload...> <crc lo> <crc hi> 0x7E
/// ```
/// Everything between the flags is stuffed. The CRC covers address,
/// control and payload.
pub fn encode_frame(
    address: u8,
    control: Control,
    payload: &[u8],
    config: &FrameConfig,
    dst: &mut BytesMut,
) {
    let control = control.to_byte();
    let mut crc = Crc16::new();
    crc.update(address);
    crc.update(control);
    crc.update_slice(payload);
    let crc = crc.get();

    let esc = config.escape_control_chars;
    dst.reserve(2 * (MIN_FRAME_SIZE + payload.len()) + 2);
    dst.put_u8(FLAG);
    stuff_byte(address, esc, dst);
    stuff_byte(control, esc, dst);
    stuff(payload, esc, dst);
    stuff_byte(crc as u8, esc, dst);
    stuff_byte((crc >> 8) as u8, esc, dst);
    dst.put_u8(FLAG);
}

/// Parse an unstuffed frame body (address through CRC).
pub fn parse_frame(body: &[u8]) -> Result<Frame> {
    if body.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            len: body.len(),
            min: MIN_FRAME_SIZE,
        });
    }
    let n = body.len();
    let received = u16::from(body[n - 2]) | (u16::from(body[n - 1]) << 8);
    let computed = crc16(&body[..n - 2]);
    if received != computed {
        return Err(FrameError::CrcMismatch { received, computed });
    }
    Ok(Frame {
        address: body[0],
        control: Control::from_byte(body[1]),
        payload: Bytes::copy_from_slice(&body[2..n - 2]),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    InFrame,
    Escaping,
}

/// Streaming receive side of the codec.
///
/// Fed one byte at a time; yields a result each time a closing flag ends a
/// non-empty frame.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buf: BytesMut,
    crc: Crc16,
    max_frame_size: usize,
    overrun: bool,
}

impl FrameDecoder {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            state: DecodeState::Idle,
            buf: BytesMut::with_capacity(config.max_frame_size),
            crc: Crc16::new(),
            max_frame_size: config.max_frame_size,
            overrun: false,
        }
    }

    /// Whether the decoder is between frames.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Idle
    }

    /// Drop any partial frame and wait for the next opening flag.
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.buf.clear();
        self.crc.reset();
        self.overrun = false;
    }

    /// Feed one received byte.
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame>> {
        match self.state {
            DecodeState::Idle => {
                if byte == FLAG {
                    self.buf.clear();
                    self.crc.reset();
                    self.overrun = false;
                    self.state = DecodeState::InFrame;
                }
                None
            }
            DecodeState::InFrame => match byte {
                FLAG if self.buf.is_empty() => None,
                FLAG => {
                    self.state = DecodeState::Idle;
                    Some(self.finish())
                }
                ESCAPE => {
                    self.state = DecodeState::Escaping;
                    None
                }
                _ => {
                    self.store(byte);
                    None
                }
            },
            DecodeState::Escaping => {
                self.state = DecodeState::InFrame;
                self.store(byte ^ ESCAPE_XOR);
                None
            }
        }
    }

    /// Feed a buffer, collecting every completed frame.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Result<Frame>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    fn store(&mut self, byte: u8) {
        if self.buf.len() < self.max_frame_size {
            self.buf.put_u8(byte);
            self.crc.update(byte);
        } else {
            self.overrun = true;
        }
    }

    fn finish(&mut self) -> Result<Frame> {
        let body = self.buf.split().freeze();
        if self.overrun {
            self.overrun = false;
            return Err(FrameError::Overrun {
                max: self.max_frame_size,
            });
        }
        if body.len() < MIN_FRAME_SIZE {
            return Err(FrameError::TooShort {
                len: body.len(),
                min: MIN_FRAME_SIZE,
            });
        }

        let n = body.len();
        let received = u16::from(body[n - 2]) | (u16::from(body[n - 1]) << 8);
        let computed = self.crc.before_last_two();
        if received != computed {
            return Err(FrameError::CrcMismatch { received, computed });
        }

        let frame = Frame {
            address: body[0],
            control: Control::from_byte(body[1]),
            payload: body.slice(2..n - 2),
        };
        trace!(control = %frame.control, len = frame.payload.len(), "frame decoded");
        Ok(frame)
    }
}
