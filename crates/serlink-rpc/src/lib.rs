//! Typed remote procedure calls over a serial link.
//!
//! Commands are identified by a single byte and declared once in a
//! [`CommandTable`] with their argument and return types. A packet on the
//! link is the command id followed by the big-endian encoded arguments;
//! a reply reuses the id of the command it answers.
//!
//! [`RpcEndpoint`] ties a [`Link`](serlink_link::Link) to a [`Dispatcher`]:
//! a responder runs handlers and sends their return values back, a caller
//! blocks in [`RpcEndpoint::call`] until the matching reply arrives.

pub mod command;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod wire;

pub use command::{Command, CommandTable, CommandTableBuilder, Handler, COMMAND_SLOTS};
pub use dispatch::{DispatchStats, Dispatcher, Role};
pub use endpoint::{RpcConfig, RpcEndpoint, DEFAULT_MAX_POLL_INTERVAL};
pub use error::{Result, RpcError};
pub use wire::{
    decode_args, decode_value, encode_args, PacketBuilder, Value, WireError, WireType,
};
