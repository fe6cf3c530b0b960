//! Bot command system.
//!
//! Commands are unit structs implementing [`Command`], registered in a
//! compile-time table the registry instantiates. Dispatch (prefix parsing,
//! name resolution, enabled/permission checks) lives in the router; the
//! registry only resolves names. A reload rebuilds the registry from the
//! same table.

mod die;
mod help;
mod info;
mod kick;
mod rehash;
mod say;
mod sleep;
mod topic;
mod wake;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::bot::Context;

/// Failure inside a command handler, reported back to the room.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

/// What a command asks the bot to say, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to post.
    None,
    /// Post `text`; `add_to_history` controls whether the line enters the
    /// room's chat log.
    Say { text: String, add_to_history: bool },
}

impl Reply {
    /// A reply kept out of the chat log (the default for command output).
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Say {
            text: text.into(),
            add_to_history: false,
        }
    }

    /// A reply that also enters the chat log, as if the bot had said it
    /// unprompted.
    pub fn spoken(text: impl Into<String>) -> Self {
        Reply::Say {
            text: text.into(),
            add_to_history: true,
        }
    }
}

/// An invocation, already split into name and arguments by the router.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub nick: String,
    pub channel: String,
    pub args: Vec<String>,
}

/// One bot command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name the command is invoked by (lowercase).
    fn name(&self) -> &'static str;

    /// One-line help text.
    fn help(&self) -> &'static str;

    /// Argument synopsis shown by `help <command>`.
    fn usage(&self) -> &'static str {
        ""
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError>;
}

/// Name-resolved table of command instances.
pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Instantiate every built-in command.
    pub fn new() -> Self {
        let table: [Arc<dyn Command>; 9] = [
            Arc::new(die::Die),
            Arc::new(help::Help),
            Arc::new(info::Info),
            Arc::new(kick::Kick),
            Arc::new(rehash::Rehash),
            Arc::new(say::Say),
            Arc::new(sleep::Sleep),
            Arc::new(topic::Topic),
            Arc::new(wake::Wake),
        ];
        let mut commands = HashMap::new();
        for cmd in table {
            commands.insert(cmd.name(), cmd);
        }
        CommandRegistry { commands }
    }

    /// Resolve a command by (lowercased) name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        CommandRegistry::new()
    }
}
