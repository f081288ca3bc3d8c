use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use serlink_link::{Link, LinkState};
use serlink_transport::{Clock, Transport};
use tracing::{debug, warn};

use crate::command::CommandTable;
use crate::dispatch::{Dispatcher, Role};
use crate::error::{Result, RpcError};
use crate::wire::{decode_value, encode_args, Value};

/// Default upper bound on a single blocking poll inside `wait`.
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for an [`RpcEndpoint`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub role: Role,
    /// Bound on how long `wait` blocks for a reply. Default: none.
    pub call_timeout: Option<Duration>,
    /// Longest single transport poll while waiting. Default: 100 ms.
    pub max_poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            role: Role::Caller,
            call_timeout: None,
            max_poll_interval: DEFAULT_MAX_POLL_INTERVAL,
        }
    }
}

/// RPC endpoint: a [`Link`] plus the [`Dispatcher`] it delivers to.
#[derive(Debug)]
pub struct RpcEndpoint<T, C> {
    link: Link<T, C>,
    dispatcher: Dispatcher,
    config: RpcConfig,
}

impl<T: Transport, C: Clock> RpcEndpoint<T, C> {
    pub fn new(link: Link<T, C>, table: CommandTable, config: RpcConfig) -> Self {
        Self {
            link,
            dispatcher: Dispatcher::new(table, config.role),
            config,
        }
    }

    pub fn link(&self) -> &Link<T, C> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link<T, C> {
        &mut self.link
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Begin link establishment.
    pub fn connect(&mut self) -> Result<()> {
        self.link.connect()?;
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.link.disconnect(&mut self.dispatcher)?;
        Ok(())
    }

    /// Encode `args` for `cmd` and queue the packet. Does not wait.
    pub fn send(&mut self, cmd: u8, args: &[Value]) -> Result<()> {
        let command = self
            .dispatcher
            .table()
            .get(cmd)
            .ok_or(RpcError::UnknownCommand(cmd))?;
        let mut packet = BytesMut::with_capacity(16);
        packet.put_u8(cmd);
        encode_args(&command.args, args, &mut packet)?;
        debug!(cmd, name = %command.name, "send");
        self.link.send_packet(packet.freeze())?;
        Ok(())
    }

    /// Queue a packet with pre-encoded arguments.
    pub fn send_raw(&mut self, cmd: u8, args: &[u8]) -> Result<()> {
        let mut packet = BytesMut::with_capacity(1 + args.len());
        packet.put_u8(cmd);
        packet.put_slice(args);
        self.link.send_packet(packet.freeze())?;
        Ok(())
    }

    /// Send `cmd` and start buffering its reply.
    pub fn request(&mut self, cmd: u8, args: &[Value]) -> Result<()> {
        self.dispatcher.expect_reply(cmd);
        if let Err(e) = self.send(cmd, args) {
            self.dispatcher.forget(cmd);
            return Err(e);
        }
        Ok(())
    }

    /// Whether a reply for `cmd` is buffered.
    pub fn reply_ready(&self, cmd: u8) -> bool {
        self.dispatcher.has_reply(cmd)
    }

    /// Drive the event loop until the reply for `cmd` arrives, then decode
    /// it with the command's return type. Commands without a return type
    /// yield `None`.
    pub fn wait(&mut self, cmd: u8) -> Result<Option<Value>> {
        if self.dispatcher.is_dispatching() {
            return Err(RpcError::NestedWait);
        }
        let ret = self
            .dispatcher
            .table()
            .get(cmd)
            .ok_or(RpcError::UnknownCommand(cmd))?
            .ret;
        self.dispatcher.expect_reply(cmd);

        let started = Instant::now();
        loop {
            if let Some(reply) = self.dispatcher.take_reply(cmd) {
                return match ret {
                    Some(ty) => Ok(Some(decode_value(ty, &reply)?)),
                    None => {
                        if !reply.is_empty() {
                            warn!(cmd, len = reply.len(), "ignoring payload of void reply");
                        }
                        Ok(None)
                    }
                };
            }

            let mut max_wait = self.config.max_poll_interval;
            if let Some(limit) = self.config.call_timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    self.dispatcher.forget(cmd);
                    return Err(RpcError::Timeout { cmd, after: limit });
                }
                max_wait = max_wait.min(limit - elapsed);
            }

            if let Err(e) = self.link.wait_events_for(Some(max_wait), &mut self.dispatcher) {
                self.dispatcher.forget(cmd);
                return Err(e.into());
            }
        }
    }

    /// `request` followed by `wait`.
    pub fn call(&mut self, cmd: u8, args: &[Value]) -> Result<Option<Value>> {
        self.request(cmd, args)?;
        self.wait(cmd)
    }

    /// Service I/O and timers once; see [`Link::wait_events`].
    pub fn poll_events(&mut self, block: bool) -> Result<bool> {
        Ok(self.link.wait_events(block, &mut self.dispatcher)?)
    }

    /// Service I/O and timers once, waiting at most `max_wait`.
    pub fn poll_events_for(&mut self, max_wait: Duration) -> Result<bool> {
        Ok(self.link.wait_events_for(Some(max_wait), &mut self.dispatcher)?)
    }

    /// Feed bytes received out of band (for hosts that own the read loop).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.process_bytes(bytes, &mut self.dispatcher)?;
        Ok(())
    }

    pub fn into_link(self) -> Link<T, C> {
        self.link
    }
}
