use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Orderly shutdown: QUIT, then stop every worker loop.
pub struct Die;

#[async_trait]
impl Command for Die {
    fn name(&self) -> &'static str {
        "die"
    }

    fn help(&self) -> &'static str {
        "Shut down the bot"
    }

    fn usage(&self) -> &'static str {
        "[reason]"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let reason = if req.args.is_empty() {
            format!("Shutdown requested by {}", req.nick)
        } else {
            req.args.join(" ")
        };
        info!(nick = %req.nick, reason = %reason, "die command received");
        ctx.writer.send_raw(format!("QUIT :{}", reason));
        ctx.stop();
        Ok(Reply::None)
    }
}
