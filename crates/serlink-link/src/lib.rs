//! Link engine for serial links.
//!
//! A [`Link`] runs an HDLC-derived protocol over any
//! [`Transport`](serlink_transport::Transport):
//! - SNRM/UA link establishment with periodic retry, DISC/DM teardown
//! - 3-bit sequence numbers with piggybacked acknowledgments
//! - go-back-N retransmission on REJ or timeout, selective resend on SREJ
//! - RNR flow control and a bounded transmit window
//!
//! Accepted payloads are delivered to a [`DispatchTarget`].

pub mod config;
pub mod error;
pub mod link;
pub mod stats;
pub mod target;
pub mod window;

pub use config::{LinkConfig, DEFAULT_LINK_TIMEOUT, DEFAULT_RETRANSMIT_TIMEOUT};
pub use error::{LinkError, Result};
pub use link::{Link, LinkState};
pub use stats::LinkStats;
pub use target::{Discard, DispatchTarget, Outbox};
pub use window::{PacketQueue, TransmitWindow, MAX_IN_FLIGHT, WINDOW_SLOTS};
