//! Two links wired back to back over in-memory transports.

use std::time::Duration;

use serlink_link::{DispatchTarget, Link, LinkConfig, LinkState, Outbox};
use serlink_transport::{ManualClock, MemoryTransport};

type TestLink = Link<MemoryTransport, ManualClock>;

#[derive(Default)]
struct Collector {
    packets: Vec<Vec<u8>>,
    /// Reply with the payload reversed.
    echo_reversed: bool,
}

impl DispatchTarget for Collector {
    fn process_packet(&mut self, payload: &[u8], outbox: &mut Outbox) {
        self.packets.push(payload.to_vec());
        if self.echo_reversed {
            let mut reply = payload.to_vec();
            reply.reverse();
            outbox.push(reply);
        }
    }
}

fn link(config: LinkConfig) -> TestLink {
    Link::new(MemoryTransport::new(), ManualClock::new(), config).unwrap()
}

/// Move bytes between the two links until neither has anything to send.
fn settle(a: &mut TestLink, ta: &mut Collector, b: &mut TestLink, tb: &mut Collector) {
    for _ in 0..64 {
        let to_b = a.transport_mut().take_outbound();
        let to_a = b.transport_mut().take_outbound();
        if to_a.is_empty() && to_b.is_empty() {
            return;
        }
        b.process_bytes(&to_b, tb).unwrap();
        a.process_bytes(&to_a, ta).unwrap();
    }
    panic!("links did not settle");
}

fn advance(l: &mut TestLink, by: Duration) {
    l.clock_mut().advance(by);
    l.poll_timers().unwrap();
}

#[test]
fn scenario_link_establishment() {
    let (mut a, mut b) = (link(LinkConfig::default()), link(LinkConfig::default()));
    let (mut ta, mut tb) = (Collector::default(), Collector::default());

    a.connect().unwrap();
    settle(&mut a, &mut ta, &mut b, &mut tb);

    assert_eq!(a.state(), LinkState::Up);
    assert_eq!(b.state(), LinkState::Up);
    assert_eq!((a.tx_seq(), a.rx_next_seq()), (0, 0));
    assert_eq!((b.tx_seq(), b.rx_next_seq()), (0, 0));
}

#[test]
fn establishment_survives_lost_snrm() {
    let (mut a, mut b) = (link(LinkConfig::default()), link(LinkConfig::default()));
    let (mut ta, mut tb) = (Collector::default(), Collector::default());

    a.connect().unwrap();
    a.transport_mut().take_outbound();
    settle(&mut a, &mut ta, &mut b, &mut tb);
    assert_eq!(b.state(), LinkState::Down);

    advance(&mut a, Duration::from_millis(1000));
    settle(&mut a, &mut ta, &mut b, &mut tb);
    assert!(a.is_up());
    assert!(b.is_up());
}

#[test]
fn scenario_window_holds_second_packet_until_rr() {
    let (mut a, mut b) = (link(LinkConfig::default()), link(LinkConfig::default()));
    let (mut ta, mut tb) = (Collector::default(), Collector::default());
    a.connect().unwrap();
    settle(&mut a, &mut ta, &mut b, &mut tb);

    a.send_packet(vec![1]).unwrap();
    a.send_packet(vec![2]).unwrap();
    assert_eq!(a.unacked(), 1);
    assert_eq!(a.pending(), 1);

    // Deliver the first packet only; b answers with RR(1).
    let first = a.transport_mut().take_outbound();
    b.process_bytes(&first, &mut tb).unwrap();
    assert_eq!(tb.packets, vec![vec![1]]);
    assert_eq!(a.pending(), 1);

    let rr = b.transport_mut().take_outbound();
    a.process_bytes(&rr, &mut ta).unwrap();
    assert_eq!(a.pending(), 0);
    assert_eq!(a.unacked(), 1);

    settle(&mut a, &mut ta, &mut b, &mut tb);
    assert_eq!(tb.packets, vec![vec![1], vec![2]]);
    assert_eq!(a.unacked(), 0);
}

#[test]
fn replies_flow_back_with_piggybacked_acks() {
    let (mut a, mut b) = (link(LinkConfig::default()), link(LinkConfig::default()));
    let mut ta = Collector::default();
    let mut tb = Collector {
        echo_reversed: true,
        ..Default::default()
    };
    a.connect().unwrap();
    settle(&mut a, &mut ta, &mut b, &mut tb);

    for i in 0..20u8 {
        a.send_packet(vec![i, i + 1]).unwrap();
        settle(&mut a, &mut ta, &mut b, &mut tb);
    }

    assert_eq!(tb.packets.len(), 20);
    assert_eq!(ta.packets.len(), 20);
    assert_eq!(ta.packets[19], vec![20, 19]);
    assert_eq!(a.unacked(), 0);
    assert_eq!(b.unacked(), 0);
    // 20 packets wrap the 3-bit counters.
    assert_eq!(a.tx_seq(), 20 % 8);
    assert_eq!(b.rx_next_seq(), 20 % 8);
}

#[test]
fn wider_window_delivers_in_order_after_loss() {
    let config = LinkConfig {
        allowed_packets_in_transit: 4,
        ..Default::default()
    };
    let (mut a, mut b) = (link(config.clone()), link(config));
    let (mut ta, mut tb) = (Collector::default(), Collector::default());
    a.connect().unwrap();
    settle(&mut a, &mut ta, &mut b, &mut tb);

    for i in 0..4u8 {
        a.send_packet(vec![i]).unwrap();
    }
    // Lose the first frame of the burst; b sees the other three out of order.
    let burst = a.transport_mut().take_outbound();
    let first_end = burst.iter().skip(1).position(|&b| b == 0x7E).unwrap() + 2;
    b.process_bytes(&burst[first_end..], &mut tb).unwrap();
    assert!(tb.packets.is_empty());
    assert_eq!(b.stats().rejects_sent, 3);

    settle(&mut a, &mut ta, &mut b, &mut tb);
    assert_eq!(tb.packets, vec![vec![0], vec![1], vec![2], vec![3]]);
    assert_eq!(a.unacked(), 0);
}

#[test]
fn lost_ack_is_recovered_by_retransmit() {
    let (mut a, mut b) = (link(LinkConfig::default()), link(LinkConfig::default()));
    let (mut ta, mut tb) = (Collector::default(), Collector::default());
    a.connect().unwrap();
    settle(&mut a, &mut ta, &mut b, &mut tb);

    a.send_packet(vec![42]).unwrap();
    let frame = a.transport_mut().take_outbound();
    b.process_bytes(&frame, &mut tb).unwrap();
    b.transport_mut().take_outbound();
    assert_eq!(a.unacked(), 1);

    advance(&mut a, Duration::from_millis(500));
    settle(&mut a, &mut ta, &mut b, &mut tb);

    assert_eq!(tb.packets, vec![vec![42]]);
    assert_eq!(b.stats().out_of_sequence, 1);
    assert_eq!(a.unacked(), 0);
}
