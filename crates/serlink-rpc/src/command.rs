use std::fmt;

use crate::error::{Result, RpcError};
use crate::wire::{Value, WireType};

/// Number of addressable command ids.
pub const COMMAND_SLOTS: usize = 256;

/// Local implementation of a command.
///
/// Receives the decoded arguments and returns the value to send back, if
/// the command declares a return type.
pub type Handler = Box<dyn FnMut(&[Value]) -> Option<Value>>;

/// Signature of a command: id, name, argument types and return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: u8,
    pub name: String,
    pub args: Vec<WireType>,
    pub ret: Option<WireType>,
}

impl Command {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            args: Vec::new(),
            ret: None,
        }
    }

    pub fn arg(mut self, ty: WireType) -> Self {
        self.args.push(ty);
        self
    }

    pub fn args(mut self, types: impl IntoIterator<Item = WireType>) -> Self {
        self.args.extend(types);
        self
    }

    pub fn returns(mut self, ty: WireType) -> Self {
        self.ret = Some(ty);
        self
    }
}

pub(crate) struct Entry {
    pub(crate) command: Command,
    pub(crate) handler: Option<Handler>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("command", &self.command)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Immutable map from command id to signature and optional handler.
#[derive(Debug)]
pub struct CommandTable {
    entries: Vec<Option<Entry>>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn get(&self, id: u8) -> Option<&Command> {
        self.entries[id as usize].as_ref().map(|e| &e.command)
    }

    /// Whether a local handler is registered for `id`.
    pub fn has_handler(&self, id: u8) -> bool {
        self.entries[id as usize]
            .as_ref()
            .is_some_and(|e| e.handler.is_some())
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter().flatten().map(|e| &e.command)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn entry_mut(&mut self, id: u8) -> Option<&mut Entry> {
        self.entries[id as usize].as_mut()
    }
}

/// Collects command declarations; [`CommandTableBuilder::build`] rejects
/// duplicate ids.
#[derive(Default)]
pub struct CommandTableBuilder {
    entries: Vec<Entry>,
}

impl CommandTableBuilder {
    /// Declare a command implemented by the peer.
    pub fn declare(mut self, command: Command) -> Self {
        self.entries.push(Entry {
            command,
            handler: None,
        });
        self
    }

    /// Declare a command implemented locally.
    pub fn handle<F>(mut self, command: Command, handler: F) -> Self
    where
        F: FnMut(&[Value]) -> Option<Value> + 'static,
    {
        self.entries.push(Entry {
            command,
            handler: Some(Box::new(handler)),
        });
        self
    }

    pub fn build(self) -> Result<CommandTable> {
        let mut entries: Vec<Option<Entry>> =
            std::iter::repeat_with(|| None).take(COMMAND_SLOTS).collect();
        for entry in self.entries {
            let slot = &mut entries[entry.command.id as usize];
            if slot.is_some() {
                return Err(RpcError::DuplicateCommand(entry.command.id));
            }
            *slot = Some(entry);
        }
        Ok(CommandTable { entries })
    }
}

impl fmt::Debug for CommandTableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTableBuilder")
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_sparse_table() {
        let table = CommandTable::builder()
            .declare(Command::new(1, "ping"))
            .handle(
                Command::new(5, "add")
                    .args([WireType::U16, WireType::U16])
                    .returns(WireType::U16),
                |_| None,
            )
            .build()
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(5).map(|c| c.name.as_str()), Some("add"));
        assert_eq!(table.get(5).unwrap().ret, Some(WireType::U16));
        assert!(table.has_handler(5));
        assert!(!table.has_handler(1));
        assert!(table.get(2).is_none());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = CommandTable::builder()
            .declare(Command::new(7, "a"))
            .declare(Command::new(7, "b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::DuplicateCommand(7)));
    }

    #[test]
    fn covers_every_id() {
        let table = CommandTable::builder()
            .declare(Command::new(0, "first"))
            .declare(Command::new(255, "last").arg(WireType::Var))
            .build()
            .unwrap();
        let ids: Vec<u8> = table.commands().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 255]);
    }
}
