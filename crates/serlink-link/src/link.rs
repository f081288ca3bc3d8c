use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serlink_frame::{
    encode_frame, Control, Frame, FrameDecoder, FrameError, SupervisoryKind, UnnumberedKind,
    SEQ_MODULUS,
};
use serlink_transport::{Clock, TimerData, TimerHandle, Transport};
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::stats::LinkStats;
use crate::target::{DispatchTarget, Outbox};
use crate::window::PacketQueue;

const LINK_TIMER: TimerData = 1;
const RETRANSMIT_TIMER: TimerData = 2;

/// Connection state of a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Connecting,
    Up,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LinkState::Down => "down",
            LinkState::Connecting => "connecting",
            LinkState::Up => "up",
        })
    }
}

/// One end of a point-to-point link.
///
/// Owns the transport, the clock, the receive decoder and the transmit
/// queue. Deliveries go to a [`DispatchTarget`] supplied on every call that
/// can produce them, so the target never needs a handle back to the link.
pub struct Link<T, C> {
    transport: T,
    clock: C,
    config: LinkConfig,
    decoder: FrameDecoder,
    state: LinkState,
    queue: PacketQueue,
    rx_next: u8,
    peer_busy: bool,
    link_timer: TimerHandle,
    retransmit_timer: TimerHandle,
    stats: LinkStats,
    rx_buf: BytesMut,
    tx_buf: BytesMut,
}

impl<T: Transport, C: Clock> Link<T, C> {
    pub fn new(transport: T, clock: C, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            clock,
            decoder: FrameDecoder::new(&config.frame),
            queue: PacketQueue::new(config.allowed_packets_in_transit),
            config,
            state: LinkState::Down,
            rx_next: 0,
            peer_busy: false,
            link_timer: TimerHandle::NONE,
            retransmit_timer: TimerHandle::NONE,
            stats: LinkStats::default(),
            rx_buf: BytesMut::with_capacity(512),
            tx_buf: BytesMut::with_capacity(64),
        })
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Sequence number of the next new information frame.
    pub fn tx_seq(&self) -> u8 {
        self.queue.window().tx_seq()
    }

    /// Sequence number expected from the peer.
    pub fn rx_next_seq(&self) -> u8 {
        self.rx_next
    }

    /// Packets sent and not yet acknowledged.
    pub fn unacked(&self) -> usize {
        self.queue.window().len()
    }

    /// Packets waiting for window room or for the link to come up.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Whether the peer last reported itself busy (RNR).
    pub fn peer_busy(&self) -> bool {
        self.peer_busy
    }

    pub fn into_parts(self) -> (T, C) {
        (self.transport, self.clock)
    }

    /// Start link establishment: send SNRM and keep resending it every
    /// `link_timeout` until the peer answers.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == LinkState::Up {
            debug!("connect ignored, link already up");
            return Ok(());
        }
        self.state = LinkState::Connecting;
        self.reset_sequence();
        info!("connecting");
        self.send_snrm()
    }

    /// Send DISC and drop to `Down`.
    pub fn disconnect<D: DispatchTarget + ?Sized>(&mut self, target: &mut D) -> Result<()> {
        if self.state == LinkState::Down {
            return Ok(());
        }
        self.send_unnumbered(UnnumberedKind::Disc, &[])?;
        self.go_down(target);
        Ok(())
    }

    /// Queue a packet for sequenced delivery. It goes out immediately if the
    /// link is up and the window has room.
    pub fn send_packet(&mut self, packet: impl Into<Bytes>) -> Result<()> {
        let packet = packet.into();
        self.check_size(packet.len())?;
        self.queue.push(packet);
        self.pump()?;
        Ok(())
    }

    /// Send a UI frame. It bypasses the window and is never retransmitted.
    pub fn send_oob(&mut self, payload: &[u8]) -> Result<()> {
        self.check_size(payload.len())?;
        self.send_unnumbered(UnnumberedKind::Ui, payload)
    }

    /// Feed one received byte.
    pub fn process_byte<D: DispatchTarget + ?Sized>(
        &mut self,
        byte: u8,
        target: &mut D,
    ) -> Result<()> {
        match self.decoder.push(byte) {
            None => Ok(()),
            Some(Ok(frame)) => self.handle_frame(frame, target),
            Some(Err(err)) => {
                self.record_frame_error(&err);
                Ok(())
            }
        }
    }

    /// Feed a buffer of received bytes.
    pub fn process_bytes<D: DispatchTarget + ?Sized>(
        &mut self,
        bytes: &[u8],
        target: &mut D,
    ) -> Result<()> {
        for &b in bytes {
            self.process_byte(b, target)?;
        }
        Ok(())
    }

    /// Run the handlers of every expired timer. Returns whether any fired.
    pub fn poll_timers(&mut self) -> Result<bool> {
        let mut fired = false;
        while let Some(data) = self.clock.take_expired() {
            fired = true;
            match data {
                LINK_TIMER => {
                    self.link_timer = TimerHandle::NONE;
                    self.on_link_timeout()?;
                }
                RETRANSMIT_TIMER => {
                    self.retransmit_timer = TimerHandle::NONE;
                    self.on_retransmit_timeout()?;
                }
                other => warn!(data = other, "unknown timer expired"),
            }
        }
        Ok(fired)
    }

    /// Service I/O and timers once.
    ///
    /// With `block` set, waits for input until the next timer deadline (or
    /// indefinitely if no timer is armed); otherwise only handles what is
    /// already available. Returns whether any byte or timer was processed.
    pub fn wait_events<D: DispatchTarget + ?Sized>(
        &mut self,
        block: bool,
        target: &mut D,
    ) -> Result<bool> {
        let limit = if block { None } else { Some(Duration::ZERO) };
        self.wait_events_for(limit, target)
    }

    /// Like [`Link::wait_events`] with an upper bound on the wait. `None`
    /// waits until input arrives or the next timer deadline.
    pub fn wait_events_for<D: DispatchTarget + ?Sized>(
        &mut self,
        max_wait: Option<Duration>,
        target: &mut D,
    ) -> Result<bool> {
        let timeout = match (self.clock.next_deadline(), max_wait) {
            (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
            (deadline, limit) => deadline.or(limit),
        };

        let n = self.transport.poll_read(&mut self.rx_buf, timeout)?;
        let received = self.rx_buf.split();
        self.process_bytes(&received, target)?;

        let fired = self.poll_timers()?;
        Ok(n > 0 || fired)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        let max = self.config.max_payload();
        if len > max {
            return Err(LinkError::PacketTooLarge { size: len, max });
        }
        Ok(())
    }

    fn record_frame_error(&mut self, err: &FrameError) {
        match err {
            FrameError::CrcMismatch { received, computed } => {
                self.stats.crc_errors += 1;
                warn!(received, computed, "CRC error, frame dropped");
            }
            FrameError::TooShort { len, .. } => {
                self.stats.short_frames += 1;
                debug!(len, "short frame dropped");
            }
            FrameError::Overrun { max } => {
                self.stats.overruns += 1;
                warn!(max, "frame overrun, frame dropped");
            }
            FrameError::DanglingEscape => {
                debug!("malformed frame dropped");
            }
        }
    }

    fn handle_frame<D: DispatchTarget + ?Sized>(&mut self, frame: Frame, target: &mut D) -> Result<()> {
        self.stats.frames_received += 1;
        trace!(control = %frame.control, len = frame.payload.len(), "rx");

        match frame.control {
            Control::Unnumbered { kind, .. } => self.handle_unnumbered(kind, &frame.payload, target),
            Control::Supervisory { kind, nr, .. } => {
                if self.state != LinkState::Up {
                    debug!(kind = kind.name(), state = %self.state, "supervisory frame ignored");
                    return Ok(());
                }
                self.handle_supervisory(kind, nr)
            }
            Control::Information { ns, nr, .. } => {
                if self.state != LinkState::Up {
                    debug!(ns, state = %self.state, "information frame ignored");
                    return Ok(());
                }
                self.handle_information(ns, nr, &frame.payload, target)
            }
        }
    }

    fn handle_unnumbered<D: DispatchTarget + ?Sized>(
        &mut self,
        kind: UnnumberedKind,
        payload: &[u8],
        target: &mut D,
    ) -> Result<()> {
        match kind {
            UnnumberedKind::Snrm => {
                let requeued = self.reset_sequence();
                debug!(requeued, "peer requested link reset");
                self.send_unnumbered(UnnumberedKind::Ua, &[])?;
                self.go_up(target);
                self.pump()?;
            }
            UnnumberedKind::Ua => match self.state {
                LinkState::Connecting => {
                    self.go_up(target);
                    self.pump()?;
                }
                _ => debug!(state = %self.state, "unsolicited UA ignored"),
            },
            UnnumberedKind::Dm => match self.state {
                LinkState::Up => {
                    info!("peer in disconnected mode");
                    self.go_down(target);
                }
                _ => debug!(state = %self.state, "DM ignored"),
            },
            UnnumberedKind::Disc => {
                info!("peer disconnected");
                self.send_unnumbered(UnnumberedKind::Ua, &[])?;
                self.go_down(target);
            }
            UnnumberedKind::Ui => {
                if self.state != LinkState::Up {
                    debug!(state = %self.state, "UI frame ignored");
                    return Ok(());
                }
                let mut outbox = Outbox::new();
                target.process_oob(payload, &mut outbox);
                self.flush_outbox(outbox)?;
            }
            UnnumberedKind::Frmr | UnnumberedKind::Unknown(_) => {
                warn!(command = kind.name(), "unsupported unnumbered frame, resetting link");
                self.send_unnumbered(UnnumberedKind::Dm, &[])?;
                self.go_down(target);
            }
        }
        Ok(())
    }

    fn handle_supervisory(&mut self, kind: SupervisoryKind, nr: u8) -> Result<()> {
        match kind {
            SupervisoryKind::ReceiveReady => {
                self.acknowledge(nr);
                self.peer_busy = false;
            }
            SupervisoryKind::ReceiveNotReady => {
                self.acknowledge(nr);
                if !self.peer_busy {
                    debug!(nr, "peer busy");
                }
                self.peer_busy = true;
            }
            SupervisoryKind::Reject => {
                self.acknowledge(nr);
                self.peer_busy = false;
                debug!(nr, outstanding = self.unacked(), "peer rejected, going back");
                self.resend_outstanding()?;
            }
            SupervisoryKind::SelectiveReject => {
                let packet = self.queue.window().get(nr).cloned();
                match packet {
                    Some(packet) => {
                        debug!(seq = nr, "selective retransmit");
                        self.stats.retransmissions += 1;
                        self.send_information(nr, &packet)?;
                    }
                    None => debug!(seq = nr, "SREJ for packet not outstanding"),
                }
            }
        }
        self.pump()?;
        Ok(())
    }

    fn handle_information<D: DispatchTarget + ?Sized>(
        &mut self,
        ns: u8,
        nr: u8,
        payload: &[u8],
        target: &mut D,
    ) -> Result<()> {
        self.acknowledge(nr);

        if ns != self.rx_next {
            self.stats.out_of_sequence += 1;
            self.stats.rejects_sent += 1;
            debug!(expected = self.rx_next, got = ns, "out of sequence, sending REJ");
            return self.send_supervisory(SupervisoryKind::Reject);
        }

        self.rx_next = (self.rx_next + 1) % SEQ_MODULUS;
        self.stats.packets_received += 1;

        if !payload.is_empty() {
            let mut outbox = Outbox::new();
            target.process_packet(payload, &mut outbox);
            self.flush_outbox(outbox)?;
        }

        // A transmitted I frame already carries N(R).
        let sent = self.pump()?;
        if sent == 0 {
            self.send_supervisory(SupervisoryKind::ReceiveReady)?;
        }
        Ok(())
    }

    fn flush_outbox(&mut self, mut outbox: Outbox) -> Result<()> {
        let (packets, oob) = outbox.take();
        for packet in packets {
            if let Err(LinkError::PacketTooLarge { size, max }) = self.check_size(packet.len()) {
                warn!(size, max, "reply too large, dropped");
                continue;
            }
            self.queue.push(packet);
        }
        for payload in oob {
            if let Err(LinkError::PacketTooLarge { size, max }) = self.check_size(payload.len()) {
                warn!(size, max, "UI reply too large, dropped");
                continue;
            }
            self.send_unnumbered(UnnumberedKind::Ui, &payload)?;
        }
        Ok(())
    }

    /// Send as many queued packets as the window, the peer and the link
    /// state allow. Returns the number of information frames sent.
    fn pump(&mut self) -> Result<usize> {
        let mut sent = 0;
        while self.state == LinkState::Up && !self.peer_busy {
            let Some((seq, packet)) = self.queue.next_to_send() else {
                break;
            };
            self.stats.packets_sent += 1;
            self.send_information(seq, &packet)?;
            sent += 1;
        }
        Ok(sent)
    }

    fn acknowledge(&mut self, nr: u8) {
        let released = self.queue.window_mut().ack_up_to(nr);
        if released > 0 {
            trace!(nr, released, "acknowledged");
        }
        if self.queue.window().is_empty() {
            self.retransmit_timer = self.clock.cancel_timer(self.retransmit_timer);
        } else if released > 0 {
            self.retransmit_timer = self.clock.cancel_timer(self.retransmit_timer);
            self.arm_retransmit();
        }
    }

    fn resend_outstanding(&mut self) -> Result<()> {
        let packets: Vec<(u8, Bytes)> = self
            .queue
            .window()
            .outstanding()
            .map(|(seq, p)| (seq, p.clone()))
            .collect();
        for (seq, packet) in packets {
            self.stats.retransmissions += 1;
            self.send_information(seq, &packet)?;
        }
        Ok(())
    }

    fn on_link_timeout(&mut self) -> Result<()> {
        if self.state == LinkState::Up {
            return Ok(());
        }
        debug!("no answer to SNRM, retrying");
        self.send_snrm()
    }

    fn on_retransmit_timeout(&mut self) -> Result<()> {
        if self.state != LinkState::Up {
            return Ok(());
        }
        let oldest = self.queue.window().ack_seq();
        let Some(packet) = self.queue.window().get(oldest).cloned() else {
            return Ok(());
        };
        debug!(seq = oldest, "retransmit timeout");
        self.stats.retransmissions += 1;
        self.send_information(oldest, &packet)?;
        Ok(())
    }

    fn send_snrm(&mut self) -> Result<()> {
        self.send_unnumbered(UnnumberedKind::Snrm, &[])?;
        self.link_timer = self.clock.cancel_timer(self.link_timer);
        self.link_timer = self.clock.add_timer(self.config.link_timeout, LINK_TIMER);
        Ok(())
    }

    fn arm_retransmit(&mut self) {
        if !self.clock.is_defined(self.retransmit_timer) {
            self.retransmit_timer = self
                .clock
                .add_timer(self.config.retransmit_timeout, RETRANSMIT_TIMER);
        }
    }

    /// Rewind both sequence counters, keeping unacknowledged packets queued
    /// for delivery after the reset. Returns how many were requeued.
    fn reset_sequence(&mut self) -> usize {
        self.rx_next = 0;
        self.peer_busy = false;
        self.retransmit_timer = self.clock.cancel_timer(self.retransmit_timer);
        self.queue.requeue_outstanding()
    }

    fn go_up<D: DispatchTarget + ?Sized>(&mut self, target: &mut D) {
        self.link_timer = self.clock.cancel_timer(self.link_timer);
        if self.state != LinkState::Up {
            self.state = LinkState::Up;
            info!("link up");
            target.link_up();
        }
    }

    fn go_down<D: DispatchTarget + ?Sized>(&mut self, target: &mut D) {
        self.link_timer = self.clock.cancel_timer(self.link_timer);
        self.reset_sequence();
        self.decoder.reset();
        if self.state != LinkState::Down {
            self.state = LinkState::Down;
            info!("link down");
            target.link_down();
        }
    }

    fn send_information(&mut self, seq: u8, packet: &[u8]) -> Result<()> {
        trace!(ns = seq, nr = self.rx_next, len = packet.len(), "tx I");
        self.write_frame(Control::information(seq, self.rx_next), packet)?;
        self.arm_retransmit();
        Ok(())
    }

    fn send_supervisory(&mut self, kind: SupervisoryKind) -> Result<()> {
        trace!(kind = kind.name(), nr = self.rx_next, "tx S");
        self.write_frame(Control::supervisory(kind, self.rx_next), &[])
    }

    fn send_unnumbered(&mut self, kind: UnnumberedKind, payload: &[u8]) -> Result<()> {
        trace!(command = kind.name(), "tx U");
        self.write_frame(Control::unnumbered(kind), payload)
    }

    fn write_frame(&mut self, control: Control, payload: &[u8]) -> Result<()> {
        self.tx_buf.clear();
        encode_frame(
            self.config.station_id,
            control,
            payload,
            &self.config.frame,
            &mut self.tx_buf,
        );
        self.transport.write(&self.tx_buf)?;
        self.transport.flush()?;
        self.stats.frames_sent += 1;
        Ok(())
    }
}

impl<T, C> std::fmt::Debug for Link<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("state", &self.state)
            .field("tx_seq", &self.queue.window().tx_seq())
            .field("rx_next", &self.rx_next)
            .field("unacked", &self.queue.window().len())
            .field("pending", &self.queue.pending())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serlink_frame::{FrameConfig, DEFAULT_ADDRESS};
    use serlink_transport::{ManualClock, MemoryTransport, NoTimer};

    #[derive(Default)]
    struct Recorder {
        packets: Vec<Vec<u8>>,
        oob: Vec<Vec<u8>>,
        ups: usize,
        downs: usize,
        reply: Option<Vec<u8>>,
    }

    impl DispatchTarget for Recorder {
        fn process_packet(&mut self, payload: &[u8], outbox: &mut Outbox) {
            self.packets.push(payload.to_vec());
            if let Some(reply) = &self.reply {
                outbox.push(reply.clone());
            }
        }

        fn process_oob(&mut self, payload: &[u8], _outbox: &mut Outbox) {
            self.oob.push(payload.to_vec());
        }

        fn link_up(&mut self) {
            self.ups += 1;
        }

        fn link_down(&mut self) {
            self.downs += 1;
        }
    }

    fn wire(control: Control, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(
            DEFAULT_ADDRESS,
            control,
            payload,
            &FrameConfig::default(),
            &mut buf,
        );
        buf.to_vec()
    }

    fn sent_frames(link: &mut Link<MemoryTransport, ManualClock>) -> Vec<Frame> {
        let out = link.transport_mut().take_outbound();
        let mut dec = FrameDecoder::new(&FrameConfig::default());
        dec.push_slice(&out)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    fn controls(frames: &[Frame]) -> Vec<Control> {
        frames.iter().map(|f| f.control).collect()
    }

    fn new_link() -> Link<MemoryTransport, ManualClock> {
        Link::new(MemoryTransport::new(), ManualClock::new(), LinkConfig::default()).unwrap()
    }

    fn up_link(target: &mut Recorder) -> Link<MemoryTransport, ManualClock> {
        let mut link = new_link();
        link.connect().unwrap();
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Ua), &[]), target)
            .unwrap();
        link.transport_mut().take_outbound();
        link
    }

    #[test]
    fn connect_sends_snrm_and_arms_timer() {
        let mut link = new_link();
        link.connect().unwrap();

        assert_eq!(link.state(), LinkState::Connecting);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Snrm)]
        );
        assert_eq!(link.clock().armed(), 1);
    }

    #[test]
    fn snrm_is_resent_until_answered() {
        let mut link = new_link();
        let mut target = Recorder::default();
        link.connect().unwrap();
        link.transport_mut().take_outbound();

        link.clock_mut().advance(Duration::from_millis(1000));
        assert!(link.poll_timers().unwrap());
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Snrm)]
        );

        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Ua), &[]), &mut target)
            .unwrap();
        assert!(link.is_up());
        assert_eq!(target.ups, 1);
        assert_eq!(link.clock().armed(), 0);
    }

    #[test]
    fn peer_snrm_is_answered_with_ua() {
        let mut link = new_link();
        let mut target = Recorder::default();
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Snrm), &[]), &mut target)
            .unwrap();

        assert!(link.is_up());
        assert_eq!(link.tx_seq(), 0);
        assert_eq!(link.rx_next_seq(), 0);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Ua)]
        );
    }

    #[test]
    fn information_is_dispatched_and_acked() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::information(0, 0), &[9, 1]), &mut target)
            .unwrap();

        assert_eq!(target.packets, vec![vec![9, 1]]);
        assert_eq!(link.rx_next_seq(), 1);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::supervisory(SupervisoryKind::ReceiveReady, 1)]
        );
    }

    #[test]
    fn reply_piggybacks_acknowledgment() {
        let mut target = Recorder {
            reply: Some(vec![5, 0, 30]),
            ..Default::default()
        };
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::information(0, 0), &[5]), &mut target)
            .unwrap();

        let frames = sent_frames(&mut link);
        assert_eq!(controls(&frames), vec![Control::information(0, 1)]);
        assert_eq!(&frames[0].payload[..], &[5, 0, 30]);
    }

    #[test]
    fn empty_information_is_acked_not_dispatched() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::information(0, 0), &[]), &mut target)
            .unwrap();

        assert!(target.packets.is_empty());
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::supervisory(SupervisoryKind::ReceiveReady, 1)]
        );
    }

    #[test]
    fn out_of_sequence_sends_reject() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::information(2, 0), &[1]), &mut target)
            .unwrap();

        assert!(target.packets.is_empty());
        assert_eq!(link.rx_next_seq(), 0);
        assert_eq!(link.stats().rejects_sent, 1);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::supervisory(SupervisoryKind::Reject, 0)]
        );
    }

    #[test]
    fn information_ignored_while_down() {
        let mut target = Recorder::default();
        let mut link = new_link();

        link.process_bytes(&wire(Control::information(0, 0), &[1]), &mut target)
            .unwrap();

        assert!(target.packets.is_empty());
        assert!(link.transport().outbound().is_empty());
    }

    #[test]
    fn crc_error_drops_frame_without_side_effects() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        let mut bytes = wire(Control::information(0, 0), &[5, 1, 2]);
        bytes[4] ^= 0x01;
        link.process_bytes(&bytes, &mut target).unwrap();

        assert!(target.packets.is_empty());
        assert_eq!(link.rx_next_seq(), 0);
        assert_eq!(link.stats().crc_errors, 1);
        assert!(link.transport().outbound().is_empty());
    }

    #[test]
    fn short_frame_is_counted() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);
        link.process_bytes(&[0x7E, 0xFF, 0x01, 0x7E], &mut target)
            .unwrap();
        assert_eq!(link.stats().short_frames, 1);
    }

    #[test]
    fn retransmits_oldest_on_timeout() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.send_packet(vec![7, 7]).unwrap();
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::information(0, 0)]
        );

        link.clock_mut().advance(Duration::from_millis(500));
        link.poll_timers().unwrap();
        let frames = sent_frames(&mut link);
        assert_eq!(controls(&frames), vec![Control::information(0, 0)]);
        assert_eq!(&frames[0].payload[..], &[7, 7]);
        assert_eq!(link.stats().retransmissions, 1);

        link.process_bytes(
            &wire(Control::supervisory(SupervisoryKind::ReceiveReady, 1), &[]),
            &mut target,
        )
        .unwrap();
        assert_eq!(link.unacked(), 0);
        assert_eq!(link.clock().armed(), 0);
    }

    #[test]
    fn reject_goes_back_n() {
        let mut target = Recorder::default();
        let mut link = Link::new(
            MemoryTransport::new(),
            ManualClock::new(),
            LinkConfig {
                allowed_packets_in_transit: 3,
                ..Default::default()
            },
        )
        .unwrap();
        link.connect().unwrap();
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Ua), &[]), &mut target)
            .unwrap();

        for i in 0..3u8 {
            link.send_packet(vec![i]).unwrap();
        }
        link.transport_mut().take_outbound();

        link.process_bytes(
            &wire(Control::supervisory(SupervisoryKind::Reject, 1), &[]),
            &mut target,
        )
        .unwrap();

        let frames = sent_frames(&mut link);
        assert_eq!(
            controls(&frames),
            vec![Control::information(1, 0), Control::information(2, 0)]
        );
        assert_eq!(link.unacked(), 2);
    }

    #[test]
    fn selective_reject_resends_one() {
        let mut target = Recorder::default();
        let mut link = Link::new(
            MemoryTransport::new(),
            ManualClock::new(),
            LinkConfig {
                allowed_packets_in_transit: 3,
                ..Default::default()
            },
        )
        .unwrap();
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Snrm), &[]), &mut target)
            .unwrap();
        for i in 0..3u8 {
            link.send_packet(vec![i]).unwrap();
        }
        link.transport_mut().take_outbound();

        link.process_bytes(
            &wire(Control::supervisory(SupervisoryKind::SelectiveReject, 1), &[]),
            &mut target,
        )
        .unwrap();

        let frames = sent_frames(&mut link);
        assert_eq!(controls(&frames), vec![Control::information(1, 0)]);
        assert_eq!(link.unacked(), 3);
    }

    #[test]
    fn receive_not_ready_holds_new_packets() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.send_packet(vec![1]).unwrap();
        link.process_bytes(
            &wire(Control::supervisory(SupervisoryKind::ReceiveNotReady, 1), &[]),
            &mut target,
        )
        .unwrap();
        assert!(link.peer_busy());
        link.transport_mut().take_outbound();

        link.send_packet(vec![2]).unwrap();
        assert!(link.transport().outbound().is_empty());
        assert_eq!(link.pending(), 1);

        link.process_bytes(
            &wire(Control::supervisory(SupervisoryKind::ReceiveReady, 1), &[]),
            &mut target,
        )
        .unwrap();
        assert!(!link.peer_busy());
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::information(1, 0)]
        );
    }

    #[test]
    fn duplicate_ack_is_harmless() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);
        link.send_packet(vec![1]).unwrap();

        let rr = wire(Control::supervisory(SupervisoryKind::ReceiveReady, 1), &[]);
        link.process_bytes(&rr, &mut target).unwrap();
        link.process_bytes(&rr, &mut target).unwrap();

        assert_eq!(link.unacked(), 0);
        assert_eq!(link.tx_seq(), 1);
    }

    #[test]
    fn unknown_unnumbered_sends_dm_and_goes_down() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(
            &wire(Control::unnumbered(UnnumberedKind::Unknown(0x27)), &[]),
            &mut target,
        )
        .unwrap();

        assert_eq!(link.state(), LinkState::Down);
        assert_eq!(target.downs, 1);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Dm)]
        );
    }

    #[test]
    fn disc_is_acknowledged() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Disc), &[]), &mut target)
            .unwrap();

        assert_eq!(link.state(), LinkState::Down);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Ua)]
        );
    }

    #[test]
    fn dm_takes_link_down() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Dm), &[]), &mut target)
            .unwrap();
        assert_eq!(link.state(), LinkState::Down);
        assert!(link.transport().outbound().is_empty());
    }

    #[test]
    fn local_disconnect_sends_disc() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);
        link.disconnect(&mut target).unwrap();
        assert_eq!(link.state(), LinkState::Down);
        assert_eq!(target.downs, 1);
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![Control::unnumbered(UnnumberedKind::Disc)]
        );
    }

    #[test]
    fn ui_frames_bypass_window() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);

        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Ui), b"hi"), &mut target)
            .unwrap();

        assert_eq!(target.oob, vec![b"hi".to_vec()]);
        assert_eq!(link.rx_next_seq(), 0);
        assert!(link.transport().outbound().is_empty());

        link.send_oob(b"yo").unwrap();
        let frames = sent_frames(&mut link);
        assert_eq!(controls(&frames), vec![Control::unnumbered(UnnumberedKind::Ui)]);
        assert_eq!(link.unacked(), 0);
    }

    #[test]
    fn packets_wait_for_link_up() {
        let mut target = Recorder::default();
        let mut link = new_link();
        link.send_packet(vec![1]).unwrap();
        assert!(link.transport().outbound().is_empty());
        assert_eq!(link.pending(), 1);

        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Snrm), &[]), &mut target)
            .unwrap();
        assert_eq!(
            controls(&sent_frames(&mut link)),
            vec![
                Control::unnumbered(UnnumberedKind::Ua),
                Control::information(0, 0)
            ]
        );
    }

    #[test]
    fn peer_reset_requeues_unacked() {
        let mut target = Recorder::default();
        let mut link = up_link(&mut target);
        link.send_packet(vec![1]).unwrap();
        link.send_packet(vec![2]).unwrap();
        link.transport_mut().take_outbound();

        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Snrm), &[]), &mut target)
            .unwrap();

        let frames = sent_frames(&mut link);
        assert_eq!(
            controls(&frames),
            vec![
                Control::unnumbered(UnnumberedKind::Ua),
                Control::information(0, 0)
            ]
        );
        assert_eq!(&frames[1].payload[..], &[1]);
        assert_eq!(link.pending(), 1);
    }

    #[test]
    fn oversized_packet_rejected() {
        let mut link = new_link();
        let err = link.send_packet(vec![0u8; 2000]).unwrap_err();
        assert!(matches!(err, LinkError::PacketTooLarge { size: 2000, .. }));
    }

    #[test]
    fn works_without_timers() {
        let mut target = Recorder::default();
        let mut link = Link::new(MemoryTransport::new(), NoTimer, LinkConfig::default()).unwrap();
        link.connect().unwrap();
        link.process_bytes(&wire(Control::unnumbered(UnnumberedKind::Ua), &[]), &mut target)
            .unwrap();
        link.send_packet(vec![3]).unwrap();
        assert!(link.is_up());
        assert_eq!(link.unacked(), 1);
        assert!(!link.poll_timers().unwrap());
    }

    #[test]
    fn wait_events_feeds_input_and_timers() {
        let mut target = Recorder::default();
        let mut link = new_link();
        assert!(!link.wait_events(false, &mut target).unwrap());

        link.transport_mut()
            .push_inbound(&wire(Control::unnumbered(UnnumberedKind::Snrm), &[]));
        assert!(link.wait_events(true, &mut target).unwrap());
        assert!(link.is_up());
    }

    #[test]
    fn closed_transport_surfaces_error() {
        let mut target = Recorder::default();
        let mut link = new_link();
        link.transport_mut().close();
        let err = link.wait_events(true, &mut target).unwrap_err();
        assert!(err.is_closed());
    }
}
