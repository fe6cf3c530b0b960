use std::sync::Arc;

use async_trait::async_trait;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Shows the active behavioral settings for the channel.
pub struct Info;

#[async_trait]
impl Command for Info {
    fn name(&self) -> &'static str {
        "info"
    }

    fn help(&self) -> &'static str {
        "Display bot settings for this channel"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let settings = ctx.config.snapshot();
        let channel = &req.channel;
        let service = settings.get_str(channel, "ai_service", "openai");
        let model = settings.get_str(channel, "ai_model", "gpt-4o-mini");
        let prefix = settings.cmd_prefix(channel);

        let mut behaviors = Vec::new();
        if settings.get_bool(channel, "ai_entrance", false) {
            behaviors.push("entrance".to_string());
        }
        if settings.get_bool(channel, "ai_mention", false) {
            behaviors.push("mentions".to_string());
        }
        if settings.get_bool(channel, "ai_continue", false) {
            behaviors.push(format!(
                "continue every {}s",
                settings.get_u64(channel, "ai_continue_freq", 30)
            ));
        }
        let idle = settings.get_u64(channel, "idle_chat_interval", 0);
        if idle > 0 {
            behaviors.push(format!("idle chat every {}s", idle));
        }
        let behavior = if behaviors.is_empty() {
            "none".to_string()
        } else {
            behaviors.join(", ")
        };

        let uptime_mins = ctx.started.elapsed().as_secs() / 60;
        Ok(Reply::text(format!(
            "**{}** v{} | Up: {}m | Prefix: **{}** | AI: **{}** model **{}** | Behaviors: {}",
            ctx.current_nick(),
            env!("CARGO_PKG_VERSION"),
            uptime_mins,
            prefix,
            service,
            model,
            behavior
        )))
    }
}
