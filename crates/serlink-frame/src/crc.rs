use std::fmt;

use crc::{Crc, Digest, CRC_16_MCRF4XX};

/// CRC-16/MCRF4XX: reflected CCITT polynomial, init `0xFFFF`, no final XOR.
pub const CRC_16: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Initial value of the running CRC at the start of every frame.
pub const CRC_INIT: u16 = 0xFFFF;

/// Incremental CRC16-CCITT accumulator.
///
/// Besides the running value it remembers the value as it stood two bytes
/// ago. A receiver feeds every byte of a frame including the trailing CRC,
/// then compares [`Crc16::before_last_two`] with those two bytes.
#[derive(Clone)]
pub struct Crc16 {
    digest: Digest<'static, u16>,
    crc: u16,
    minus_one: u16,
    minus_two: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self {
            digest: CRC_16.digest(),
            crc: CRC_INIT,
            minus_one: CRC_INIT,
            minus_two: CRC_INIT,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn update(&mut self, byte: u8) {
        self.minus_two = self.minus_one;
        self.minus_one = self.crc;
        self.digest.update(&[byte]);
        // No final XOR, so the finalized value is the running register.
        self.crc = self.digest.clone().finalize();
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update(b);
        }
    }

    /// Current value.
    pub fn get(&self) -> u16 {
        self.crc
    }

    /// Value before the two most recent bytes were fed.
    pub fn before_last_two(&self) -> u16 {
        self.minus_two
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc16")
            .field("crc", &format_args!("{:#06x}", self.crc))
            .field("before_last_two", &format_args!("{:#06x}", self.minus_two))
            .finish()
    }
}

/// CRC of a complete buffer.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC_16.checksum(bytes)
}
