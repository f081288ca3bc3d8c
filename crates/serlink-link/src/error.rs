/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] serlink_transport::TransportError),

    /// The link configuration is unusable.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),

    /// Payload does not fit in a frame.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },
}

impl LinkError {
    /// True when the underlying transport reported end of stream.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(serlink_transport::TransportError::Closed)
        )
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
