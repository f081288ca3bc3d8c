/// Errors reported by the frame codec.
///
/// Every variant describes a frame that was discarded; the decoder itself
/// always recovers at the next flag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Completed frame shorter than address + control + CRC.
    #[error("frame too short ({len} bytes, min {min})")]
    TooShort { len: usize, min: usize },

    /// Trailing CRC does not match the frame contents.
    #[error("CRC mismatch (received {received:#06x}, computed {computed:#06x})")]
    CrcMismatch { received: u16, computed: u16 },

    /// The frame exceeded the configured maximum size and was truncated.
    #[error("frame overrun (max {max} bytes)")]
    Overrun { max: usize },

    /// An escape byte was the last byte of a stuffed buffer.
    #[error("dangling escape at end of input")]
    DanglingEscape,
}

pub type Result<T> = std::result::Result<T, FrameError>;
