use std::sync::Arc;

use async_trait::async_trait;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Lists commands, or shows usage for one of them.
pub struct Help;

#[async_trait]
impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> &'static str {
        "Show available commands"
    }

    fn usage(&self) -> &'static str {
        "[command]"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let settings = ctx.config.snapshot();
        let prefix = settings.cmd_prefix(&req.channel);

        if let Some(name) = req.args.first() {
            let name = name.to_lowercase();
            let cmd = ctx.commands.read().unwrap().get(&name);
            return Ok(match cmd {
                Some(cmd) if cmd.usage().is_empty() => {
                    Reply::text(format!("{}{} - {}", prefix, cmd.name(), cmd.help()))
                }
                Some(cmd) => Reply::text(format!(
                    "{}{} {} - {}",
                    prefix,
                    cmd.name(),
                    cmd.usage(),
                    cmd.help()
                )),
                // Unknown commands are ignored silently.
                None => Reply::None,
            });
        }

        let names = ctx.commands.read().unwrap().names();
        Ok(Reply::text(format!(
            "Available commands: {} - For details, use: {}help <command>",
            names.join(", "),
            prefix
        )))
    }
}
