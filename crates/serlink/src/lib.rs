//! Reliable framed links and typed RPC over serial lines.
//!
//! serlink carries packets between two stations over a byte stream (a UART,
//! a USB CDC device, a socket) with HDLC-style framing, CRC16 error
//! detection and go-back-N retransmission. On top of the link sits a small
//! RPC layer with typed, big-endian encoded arguments.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transports and timer facilities
//! - [`frame`]: byte stuffing, CRC and the control field codec
//! - [`link`]: the link engine (establishment, sequencing, acknowledgment)
//! - [`rpc`]: command tables, dispatch and blocking calls (behind `rpc` feature)

/// Re-export transport types.
pub mod transport {
    pub use serlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serlink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use serlink_link::*;
}

/// Re-export RPC types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use serlink_rpc::*;
}
