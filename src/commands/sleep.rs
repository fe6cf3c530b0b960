use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;

/// Puts the bot to sleep in the channel for a bounded number of minutes.
pub struct Sleep;

#[async_trait]
impl Command for Sleep {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn help(&self) -> &'static str {
        "Suppress generated chatter for a while"
    }

    fn usage(&self) -> &'static str {
        "<minutes>"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        let settings = ctx.config.snapshot();
        let prefix = settings.cmd_prefix(&req.channel);

        let Some(raw) = req.args.first() else {
            return Ok(Reply::text(format!("{}sleep <minutes>", prefix)));
        };
        let Ok(minutes) = raw.parse::<u64>() else {
            return Ok(Reply::text("Sleep time must be a number"));
        };
        if minutes == 0 {
            return Ok(Reply::text("Sleep time must be positive"));
        }

        let sleep_max = settings.get_u64(&req.channel, "sleep_max", 60);
        if minutes > sleep_max {
            return Ok(Reply::text(format!(
                "Sleep time cannot exceed {} minutes",
                sleep_max
            )));
        }

        ctx.timers
            .lock()
            .unwrap()
            .set_sleep(&req.channel, Instant::now() + Duration::from_secs(minutes * 60));
        info!(
            channel = %req.channel,
            nick = %req.nick,
            minutes,
            "bot put to sleep"
        );
        Ok(Reply::text(format!(
            "Going to sleep for {} minutes. Wake me with {}wake",
            minutes, prefix
        )))
    }
}
