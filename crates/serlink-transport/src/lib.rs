//! Byte transport and timer abstractions for serial links.
//!
//! This is the lowest layer of serlink. The link engine talks to the outside
//! world only through two narrow interfaces defined here:
//! - [`Transport`] moves raw bytes (write, flush, poll for input)
//! - [`Clock`] schedules and cancels timers
//!
//! Concrete implementations:
//! - [`MemoryTransport`]: in-process byte queues for deterministic tests
//! - [`SerialStream`]: Unix socket pairs and raw-mode tty devices (Unix only)
//! - [`NoTimer`], [`ManualClock`], [`SystemClock`]: timer facilities

pub mod error;
pub mod memory;
pub mod timer;
pub mod traits;

#[cfg(unix)]
pub mod stream;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use timer::{ManualClock, NoTimer, SystemClock};
pub use traits::{Clock, TimerData, TimerHandle, Transport};

#[cfg(unix)]
pub use stream::{BaudRate, SerialStream};
