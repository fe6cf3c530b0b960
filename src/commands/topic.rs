use std::sync::Arc;

use async_trait::async_trait;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;
use crate::format::markdown_to_irc;
use crate::llm::FALLBACK_TOPIC;
use crate::message::Message;
use crate::reply;

/// Replaces the channel topic, generating one when no text is given.
pub struct Topic;

#[async_trait]
impl Command for Topic {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn help(&self) -> &'static str {
        "Change the channel topic"
    }

    fn usage(&self) -> &'static str {
        "[new topic]"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let topic = if req.args.is_empty() {
            reply::generate_action(ctx, &req.channel, "ai_prompt_topic", FALLBACK_TOPIC).await
        } else {
            req.args.join(" ")
        };
        ctx.writer
            .send(Message::topic(&req.channel, markdown_to_irc(&topic)));
        Ok(Reply::None)
    }
}
