/// Counters maintained by a [`Link`](crate::Link).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames that passed CRC validation.
    pub frames_received: u64,
    /// Frames written to the transport, retransmissions included.
    pub frames_sent: u64,
    /// Information frames accepted in sequence.
    pub packets_received: u64,
    /// Information frames sent for the first time.
    pub packets_sent: u64,
    pub crc_errors: u64,
    pub short_frames: u64,
    pub overruns: u64,
    /// REJ frames sent for out-of-sequence information frames.
    pub rejects_sent: u64,
    pub retransmissions: u64,
    /// Information frames dropped because N(S) was not the expected one.
    pub out_of_sequence: u64,
}
