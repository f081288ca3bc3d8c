use std::time::Duration;

/// Errors that can occur in RPC operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Link-level error, including transport failures.
    #[error("link error: {0}")]
    Link(#[from] serlink_link::LinkError),

    /// Argument or return value marshaling failed.
    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),

    /// No command with this id is declared in the command table.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// Two table entries share a command id.
    #[error("command {0} declared twice")]
    DuplicateCommand(u8),

    /// No reply arrived within the configured call timeout.
    #[error("command {cmd} timed out after {after:?}")]
    Timeout { cmd: u8, after: Duration },

    /// `wait` was entered while a handler was running.
    #[error("nested wait while dispatching")]
    NestedWait,
}

impl RpcError {
    /// True when the peer closed the underlying transport.
    pub fn is_closed(&self) -> bool {
        matches!(self, RpcError::Link(e) if e.is_closed())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
