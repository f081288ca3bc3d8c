use std::time::Duration;

use serlink_frame::{FrameConfig, DEFAULT_ADDRESS, MIN_FRAME_SIZE};

use crate::error::{LinkError, Result};
use crate::window::MAX_IN_FLIGHT;

/// Default interval between link establishment attempts.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default delay before the oldest unacknowledged packet is resent.
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for a [`Link`](crate::Link).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Address byte written into every outgoing frame. Default: 0xFF.
    pub station_id: u8,
    /// SNRM resend interval while connecting. Default: 1000 ms.
    pub link_timeout: Duration,
    /// Retransmission interval for unacknowledged packets. Default: 500 ms.
    pub retransmit_timeout: Duration,
    /// Packets allowed in the window before new ones wait in the queue.
    /// Must be within 1..=7. Default: 1.
    pub allowed_packets_in_transit: usize,
    /// Frame codec settings.
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            station_id: DEFAULT_ADDRESS,
            link_timeout: DEFAULT_LINK_TIMEOUT,
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            allowed_packets_in_transit: 1,
            frame: FrameConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Largest information payload the peer can receive with this config.
    pub fn max_payload(&self) -> usize {
        self.frame.max_frame_size.saturating_sub(MIN_FRAME_SIZE)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_IN_FLIGHT).contains(&self.allowed_packets_in_transit) {
            return Err(LinkError::InvalidConfig(format!(
                "allowed_packets_in_transit must be within 1..={MAX_IN_FLIGHT}, got {}",
                self.allowed_packets_in_transit
            )));
        }
        if self.frame.max_frame_size <= MIN_FRAME_SIZE {
            return Err(LinkError::InvalidConfig(format!(
                "max_frame_size must exceed {MIN_FRAME_SIZE}, got {}",
                self.frame.max_frame_size
            )));
        }
        if self.link_timeout.is_zero() || self.retransmit_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "link and retransmit timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
