use std::collections::VecDeque;

use bytes::Bytes;
use serlink_frame::SEQ_MODULUS;

/// Slots in the transmit window, one per sequence number.
pub const WINDOW_SLOTS: usize = SEQ_MODULUS as usize;

/// One slot always stays free so a full window is distinguishable from an
/// empty one.
pub const MAX_IN_FLIGHT: usize = WINDOW_SLOTS - 1;

#[inline]
fn next(seq: u8) -> u8 {
    (seq + 1) % SEQ_MODULUS
}

#[inline]
fn distance(from: u8, to: u8) -> usize {
    ((to + SEQ_MODULUS - from) % SEQ_MODULUS) as usize
}

/// Ring of sent-but-unacknowledged packets indexed by sequence number.
///
/// `ack` is the oldest outstanding sequence number and `tx` the next free
/// one. Packets live in their slot until an acknowledgment moves `ack` past
/// them.
#[derive(Debug, Default)]
pub struct TransmitWindow {
    slots: [Option<Bytes>; WINDOW_SLOTS],
    ack: u8,
    tx: u8,
}

impl TransmitWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `packet` at the next sequence number.
    ///
    /// Returns the sequence number assigned, or hands the packet back if the
    /// window already holds [`MAX_IN_FLIGHT`] packets.
    pub fn queue(&mut self, packet: Bytes) -> Result<u8, Bytes> {
        if next(self.tx) == self.ack {
            return Err(packet);
        }
        let seq = self.tx;
        self.slots[seq as usize] = Some(packet);
        self.tx = next(self.tx);
        Ok(seq)
    }

    /// Most recently queued packet.
    pub fn peek(&self) -> Option<&Bytes> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.peek_index() as usize].as_ref()
    }

    /// Slot of the most recently queued packet.
    pub fn peek_index(&self) -> u8 {
        (self.tx + SEQ_MODULUS - 1) % SEQ_MODULUS
    }

    /// Outstanding packet with sequence number `seq`.
    pub fn get(&self, seq: u8) -> Option<&Bytes> {
        let seq = seq % SEQ_MODULUS;
        if distance(self.ack, seq) >= self.len() {
            return None;
        }
        self.slots[seq as usize].as_ref()
    }

    /// Release every packet from `ack` up to but excluding `seq`.
    ///
    /// `seq` outside `ack..=tx` is ignored. Returns the number of packets
    /// released; acknowledging the same `seq` twice releases nothing the
    /// second time.
    pub fn ack_up_to(&mut self, seq: u8) -> usize {
        let seq = seq % SEQ_MODULUS;
        let count = distance(self.ack, seq);
        if count > self.len() {
            return 0;
        }
        for _ in 0..count {
            self.slots[self.ack as usize] = None;
            self.ack = next(self.ack);
        }
        count
    }

    /// Outstanding packets, oldest first, with their sequence numbers.
    pub fn outstanding(&self) -> impl Iterator<Item = (u8, &Bytes)> + '_ {
        (0..self.len()).filter_map(move |i| {
            let seq = (self.ack + i as u8) % SEQ_MODULUS;
            self.slots[seq as usize].as_ref().map(|p| (seq, p))
        })
    }

    /// Remove every outstanding packet, oldest first, and rewind both
    /// counters to zero.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut packets = Vec::with_capacity(self.len());
        while self.ack != self.tx {
            if let Some(p) = self.slots[self.ack as usize].take() {
                packets.push(p);
            }
            self.ack = next(self.ack);
        }
        self.ack = 0;
        self.tx = 0;
        packets
    }

    pub fn len(&self) -> usize {
        distance(self.ack, self.tx)
    }

    pub fn is_empty(&self) -> bool {
        self.ack == self.tx
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_IN_FLIGHT
    }

    /// Oldest outstanding sequence number.
    pub fn ack_seq(&self) -> u8 {
        self.ack
    }

    /// Sequence number the next queued packet will get.
    pub fn tx_seq(&self) -> u8 {
        self.tx
    }
}

/// Transmit window plus an overflow FIFO.
///
/// Packets enter the FIFO and move into the window while fewer than
/// `allowed_in_transit` are outstanding.
#[derive(Debug)]
pub struct PacketQueue {
    window: TransmitWindow,
    pending: VecDeque<Bytes>,
    allowed_in_transit: usize,
}

impl PacketQueue {
    /// `allowed_in_transit` is clamped to `1..=MAX_IN_FLIGHT`.
    pub fn new(allowed_in_transit: usize) -> Self {
        Self {
            window: TransmitWindow::new(),
            pending: VecDeque::new(),
            allowed_in_transit: allowed_in_transit.clamp(1, MAX_IN_FLIGHT),
        }
    }

    pub fn push(&mut self, packet: Bytes) {
        self.pending.push_back(packet);
    }

    /// Whether the window accepts another packet.
    pub fn has_room(&self) -> bool {
        self.window.len() < self.allowed_in_transit
    }

    /// Move the oldest queued packet into the window if there is room.
    pub fn next_to_send(&mut self) -> Option<(u8, Bytes)> {
        if !self.has_room() {
            return None;
        }
        let packet = self.pending.pop_front()?;
        match self.window.queue(packet.clone()) {
            Ok(seq) => Some((seq, packet)),
            Err(packet) => {
                self.pending.push_front(packet);
                None
            }
        }
    }

    /// Put every unacknowledged packet back at the head of the FIFO and
    /// restart numbering at zero.
    pub fn requeue_outstanding(&mut self) -> usize {
        let packets = self.window.drain();
        let n = packets.len();
        for packet in packets.into_iter().rev() {
            self.pending.push_front(packet);
        }
        n
    }

    pub fn window(&self) -> &TransmitWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut TransmitWindow {
        &mut self.window
    }

    /// Packets waiting for window room.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn allowed_in_transit(&self) -> usize {
        self.allowed_in_transit
    }
}
