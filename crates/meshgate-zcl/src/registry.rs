//! Registry of cluster-specific commands
//!
//! Maps `(cluster, direction, command id)` to a constructor for an empty
//! typed command (used to populate outbound commands from bus parameters)
//! and to a payload decoder (used for inbound frames).

use bytes::Bytes;
use std::collections::HashMap;

use crate::cluster::Direction;
use crate::commands::local::builtin_specs;
use crate::commands::{CommandSpec, LocalCommand};
use crate::error::Result;

type CommandKey = (u16, Direction, u8);

/// Lookup table of every command this build understands
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    specs: HashMap<CommandKey, CommandSpec>,
}

impl CommandRegistry {
    /// Registry with all built-in commands
    pub fn builtin() -> Self {
        let specs = builtin_specs()
            .into_iter()
            .map(|spec| ((spec.cluster_id, spec.direction, spec.command_id), spec))
            .collect();
        Self { specs }
    }

    /// Describe a command, if registered
    pub fn lookup(&self, cluster_id: u16, direction: Direction, command_id: u8) -> Option<&CommandSpec> {
        self.specs.get(&(cluster_id, direction, command_id))
    }

    /// Fresh default-valued instance of a registered command
    pub fn instantiate(&self, cluster_id: u16, direction: Direction, command_id: u8) -> Option<LocalCommand> {
        self.lookup(cluster_id, direction, command_id)
            .map(|spec| (spec.new)())
    }

    /// Decode a payload for a registered command
    ///
    /// Returns `None` when the command is not registered.
    pub fn decode(
        &self,
        cluster_id: u16,
        direction: Direction,
        command_id: u8,
        payload: &mut Bytes,
    ) -> Option<Result<LocalCommand>> {
        self.lookup(cluster_id, direction, command_id)
            .map(|spec| (spec.decode)(payload))
    }

    /// All registered commands, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.values()
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
