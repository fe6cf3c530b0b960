use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Ends an active sleep window.
pub struct Wake;

#[async_trait]
impl Command for Wake {
    fn name(&self) -> &'static str {
        "wake"
    }

    fn help(&self) -> &'static str {
        "Wake the bot from sleep"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let was_sleeping = ctx.timers.lock().unwrap().clear_sleep(&req.channel);
        if was_sleeping {
            info!(channel = %req.channel, nick = %req.nick, "bot woken up");
            Ok(Reply::text("I'm awake! Ready to chat again."))
        } else {
            Ok(Reply::text("I wasn't sleeping!"))
        }
    }
}
