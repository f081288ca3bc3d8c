use bytes::Bytes;

/// Receiver of link-level deliveries.
///
/// The link hands each accepted payload to the target together with an
/// [`Outbox`]. Anything pushed there is queued for transmission once the
/// call returns, which is how replies get sent without the target holding
/// a reference to the link.
pub trait DispatchTarget {
    /// An in-sequence, non-empty information frame payload.
    fn process_packet(&mut self, payload: &[u8], outbox: &mut Outbox);

    /// An unnumbered information (UI) payload, delivered outside the window.
    fn process_oob(&mut self, payload: &[u8], outbox: &mut Outbox) {
        let _ = (payload, outbox);
    }

    fn link_up(&mut self) {}

    fn link_down(&mut self) {}
}

/// Packets produced while handling a delivery.
#[derive(Debug, Default)]
pub struct Outbox {
    packets: Vec<Bytes>,
    oob: Vec<Bytes>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet for sequenced delivery.
    pub fn push(&mut self, packet: impl Into<Bytes>) {
        self.packets.push(packet.into());
    }

    /// Queue a UI frame.
    pub fn push_oob(&mut self, packet: impl Into<Bytes>) {
        self.oob.push(packet.into());
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.oob.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.len() + self.oob.len()
    }

    pub(crate) fn take(&mut self) -> (Vec<Bytes>, Vec<Bytes>) {
        (
            std::mem::take(&mut self.packets),
            std::mem::take(&mut self.oob),
        )
    }
}

/// Target that discards every delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl DispatchTarget for Discard {
    fn process_packet(&mut self, _payload: &[u8], _outbox: &mut Outbox) {}
}
