use std::sync::Arc;

use async_trait::async_trait;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Makes the bot repeat a message verbatim.
pub struct Say;

#[async_trait]
impl Command for Say {
    fn name(&self) -> &'static str {
        "say"
    }

    fn help(&self) -> &'static str {
        "Make the bot say something"
    }

    fn usage(&self) -> &'static str {
        "<message>"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        if req.args.is_empty() {
            let prefix = ctx.config.snapshot().cmd_prefix(&req.channel);
            return Ok(Reply::text(format!("Usage: {}say <message>", prefix)));
        }
        Ok(Reply::text(req.args.join(" ")))
    }
}
