use std::time::Duration;

use bytes::BytesMut;

use crate::error::Result;

/// A byte-oriented, full-duplex link to the peer.
///
/// Writes carry already-framed bytes; the transport never interprets them.
/// Input is pulled by the owner of the link through [`Transport::poll_read`],
/// which is how the cooperative event loop services I/O.
pub trait Transport {
    /// Write a buffer.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Write a single byte.
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Push any buffered output to the wire.
    fn flush(&mut self) -> Result<()>;

    /// Append whatever input is available to `dst`.
    ///
    /// Waits at most `timeout` for the first byte (`None` waits indefinitely,
    /// `Some(Duration::ZERO)` never waits). Returns the number of bytes
    /// appended; `Ok(0)` means the wait timed out. A closed peer is reported
    /// as [`TransportError::Closed`](crate::TransportError::Closed).
    fn poll_read(&mut self, dst: &mut BytesMut, timeout: Option<Duration>) -> Result<usize>;
}

/// Opaque data attached to a timer and handed back when it expires.
pub type TimerData = u32;

/// Identifier of a scheduled timer.
///
/// [`TimerHandle::NONE`] is the "not armed" value; clocks that never fire
/// hand it out for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimerHandle(u32);

impl TimerHandle {
    /// The undefined handle.
    pub const NONE: TimerHandle = TimerHandle(0);

    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric id, for logging.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// True for [`TimerHandle::NONE`].
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Scheduled-event facility used by the link engine.
///
/// A clock cannot call back into the engine that owns it, so expiry is
/// reported by polling: the owner drains [`Clock::take_expired`] and runs the
/// matching logic itself. A handle stops being defined once its timer has
/// been taken or cancelled.
pub trait Clock {
    /// Arm a timer firing after `delay`.
    fn add_timer(&mut self, delay: Duration, data: TimerData) -> TimerHandle;

    /// Cancel a timer. Always returns [`TimerHandle::NONE`] so callers can
    /// write `self.timer = clock.cancel_timer(self.timer)`.
    fn cancel_timer(&mut self, handle: TimerHandle) -> TimerHandle;

    /// Whether `handle` refers to a timer that is still armed.
    fn is_defined(&self, handle: TimerHandle) -> bool;

    /// Time left until the earliest armed timer, if any.
    fn next_deadline(&self) -> Option<Duration>;

    /// Remove and return the data of one expired timer.
    fn take_expired(&mut self) -> Option<TimerData>;
}
