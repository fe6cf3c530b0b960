use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use super::{Command, CommandError, CommandRequest, Reply};
use crate::bot::Context;
use crate::reload;

/// Re-reads configuration from the registered source without touching
/// sockets or in-memory state.
pub struct Rehash;

#[async_trait]
impl Command for Rehash {
    fn name(&self) -> &'static str {
        "rehash"
    }

    fn help(&self) -> &'static str {
        "Reload configuration"
    }

    async fn execute(
        &self,
        ctx: &Arc<Context>,
        req: &CommandRequest,
    ) -> Result<Reply, CommandError> {
        // The reload pauses worker loops, including the reader currently
        // executing this command, so it must run after we return.
        let ctx = ctx.clone();
        let channel = req.channel.clone();
        tokio::spawn(async move {
            match reload::rehash(&ctx).await {
                Ok(()) => ctx.send_channel_message(&channel, "Configuration reloaded.", false),
                Err(e) => {
                    error!("rehash failed: {}", e);
                    ctx.send_channel_message(
                        &channel,
                        &format!("Rehash failed: {}", e),
                        false,
                    );
                }
            }
        });
        Ok(Reply::None)
    }
}
