use std::collections::{HashMap, HashSet};

use bytes::{BufMut, Bytes, BytesMut};
use serlink_link::{DispatchTarget, Outbox};
use tracing::{debug, trace, warn};

use crate::command::CommandTable;
use crate::wire::{decode_args, write_value};

/// Which side of the conversation an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Issues commands and waits for replies. Unsolicited commands from
    /// the peer still reach local handlers.
    #[default]
    Caller,
    /// Serves commands; handler return values are sent back.
    Responder,
}

/// Counters kept by a [`Dispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub replies_sent: u64,
    pub replies_buffered: u64,
    pub duplicate_replies: u64,
    pub decode_errors: u64,
    pub unknown_commands: u64,
}

/// Routes link payloads to command handlers or to the reply map.
#[derive(Debug)]
pub struct Dispatcher {
    table: CommandTable,
    role: Role,
    awaiting: HashSet<u8>,
    replies: HashMap<u8, Bytes>,
    dispatching: bool,
    link_up: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(table: CommandTable, role: Role) -> Self {
        Self {
            table,
            role,
            awaiting: HashSet::new(),
            replies: HashMap::new(),
            dispatching: false,
            link_up: false,
            stats: DispatchStats::default(),
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    /// Whether a handler is currently running.
    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Route future payloads for `cmd` to the reply map.
    pub fn expect_reply(&mut self, cmd: u8) {
        self.awaiting.insert(cmd);
    }

    /// Stop routing `cmd` to the reply map and drop any buffered reply.
    pub fn forget(&mut self, cmd: u8) {
        self.awaiting.remove(&cmd);
        self.replies.remove(&cmd);
    }

    pub fn is_awaiting(&self, cmd: u8) -> bool {
        self.awaiting.contains(&cmd)
    }

    pub fn has_reply(&self, cmd: u8) -> bool {
        self.replies.contains_key(&cmd)
    }

    /// Remove the buffered reply for `cmd`, ending the wait for it.
    pub fn take_reply(&mut self, cmd: u8) -> Option<Bytes> {
        let reply = self.replies.remove(&cmd)?;
        self.awaiting.remove(&cmd);
        Some(reply)
    }

    fn buffer_reply(&mut self, cmd: u8, args: &[u8]) {
        if self.replies.contains_key(&cmd) {
            self.stats.duplicate_replies += 1;
            warn!(cmd, "duplicate reply discarded");
            return;
        }
        trace!(cmd, len = args.len(), "reply buffered");
        self.stats.replies_buffered += 1;
        self.replies.insert(cmd, Bytes::copy_from_slice(args));
    }

    fn invoke(&mut self, cmd: u8, args: &[u8], outbox: Option<&mut Outbox>) {
        let Some(entry) = self.table.entry_mut(cmd) else {
            self.stats.unknown_commands += 1;
            warn!(cmd, "unknown command dropped");
            return;
        };
        let Some(handler) = entry.handler.as_mut() else {
            self.stats.unknown_commands += 1;
            warn!(cmd, name = %entry.command.name, "no local handler, dropped");
            return;
        };

        let values = match decode_args(&entry.command.args, args) {
            Ok(values) => values,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!(cmd, name = %entry.command.name, error = %e, "bad arguments, dropped");
                return;
            }
        };

        debug!(cmd, name = %entry.command.name, "dispatch");
        self.dispatching = true;
        let result = handler(&values);
        self.dispatching = false;
        self.stats.handled += 1;

        let Some(outbox) = outbox else {
            return;
        };
        let (Some(ret), Some(value)) = (entry.command.ret, result) else {
            return;
        };
        let mut reply = BytesMut::with_capacity(8);
        reply.put_u8(cmd);
        if let Err(e) = write_value(ret, &value, &mut reply) {
            warn!(cmd, error = %e, "handler returned wrong type, no reply sent");
            return;
        }
        self.stats.replies_sent += 1;
        outbox.push(reply.freeze());
    }
}

impl DispatchTarget for Dispatcher {
    fn process_packet(&mut self, payload: &[u8], outbox: &mut Outbox) {
        let Some((&cmd, args)) = payload.split_first() else {
            return;
        };
        match self.role {
            Role::Caller if self.awaiting.contains(&cmd) => self.buffer_reply(cmd, args),
            Role::Caller => self.invoke(cmd, args, None),
            Role::Responder => self.invoke(cmd, args, Some(outbox)),
        }
    }

    fn process_oob(&mut self, payload: &[u8], _outbox: &mut Outbox) {
        let Some((&cmd, args)) = payload.split_first() else {
            return;
        };
        trace!(cmd, "out-of-band command");
        self.invoke(cmd, args, None);
    }

    fn link_up(&mut self) {
        self.link_up = true;
    }

    fn link_down(&mut self) {
        self.link_up = false;
    }
}
