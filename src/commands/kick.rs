use std::sync::Arc;

use async_trait::async_trait;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;
use crate::format::markdown_to_irc;
use crate::llm::FALLBACK_KICK;
use crate::message::Message;
use crate::reply;

/// Kicks a user, generating a reason when none is given.
pub struct Kick;

#[async_trait]
impl Command for Kick {
    fn name(&self) -> &'static str {
        "kick"
    }

    fn help(&self) -> &'static str {
        "Kick a user from the channel"
    }

    fn usage(&self) -> &'static str {
        "<nick> [reason]"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let Some(target) = req.args.first() else {
            return Ok(Reply::text("Who do you want me to kick?"));
        };

        if !ctx.roster.lock().unwrap().contains(&req.channel, target) {
            return Ok(Reply::text(format!(
                "I don't see {} in the channel!",
                target
            )));
        }

        if ctx.is_protected_user(&req.channel, target) {
            return Ok(Reply::text(format!(
                "I can't kick {} - they're too powerful!",
                target
            )));
        }

        let reason = if req.args.len() > 1 {
            req.args[1..].join(" ")
        } else {
            reply::generate_action(ctx, &req.channel, "ai_prompt_kick", FALLBACK_KICK).await
        };

        ctx.writer.send(Message::kick(
            &req.channel,
            target.as_str(),
            markdown_to_irc(&reason),
        ));
        Ok(Reply::None)
    }
}
