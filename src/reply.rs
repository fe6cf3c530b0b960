//! Reply pipeline: prompt assembly, LLM dispatch, fallbacks, deferral.
//!
//! Prompts are plain text: system prompt, an optional roster block, an
//! optional history block, the turn being answered, and a cue in the
//! bot's own voice. Generation failures substitute deterministic
//! fallbacks so control flow never stalls on the LLM.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::error;

use crate::bot::Context;
use crate::casemap::irc_eq;
use crate::config::Settings;
use crate::llm::{LlmRequest, FALLBACK_ENTRANCE, FALLBACK_REPLY};

/// Default system prompt when `ai_prompt_default` is not configured.
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a witty participant in an IRC channel. Reply in one short line.";

fn default_action_prompt(key: &str) -> &'static str {
    match key {
        "ai_prompt_topic" => "Write a short, funny IRC channel topic.",
        "ai_prompt_kick" => "Write a short, witty kick reason.",
        "ai_prompt_entrance" => "Write a short entrance line for joining an IRC channel.",
        _ => "Write one short, witty line.",
    }
}

/// Assemble a conversational prompt.
pub fn build_prompt(
    system_prompt: &str,
    room: &str,
    bot_nick: &str,
    roster: Option<&[String]>,
    history: &[String],
    turn: Option<(&str, &str)>,
) -> String {
    let mut prompt = String::with_capacity(system_prompt.len() + 256);
    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");

    if let Some(members) = roster {
        if !members.is_empty() {
            let _ = writeln!(prompt, "Current users in {}: {}", room, members.join(", "));
            prompt.push('\n');
        }
    }

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for line in history {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if let Some((nick, text)) = turn {
        let _ = writeln!(prompt, "{}: {}", nick, text);
    }
    let _ = write!(prompt, "{}:", bot_nick);
    prompt
}

fn chat_request(settings: &Settings, room: &str, prompt: String) -> LlmRequest {
    LlmRequest::chat(
        settings.get_str(room, "ai_service", "openai"),
        settings.get_str(room, "ai_model", "gpt-4o-mini"),
        settings.get_str(room, "ai_key", ""),
        prompt,
    )
}

fn action_request(settings: &Settings, room: &str, prompt: String) -> LlmRequest {
    LlmRequest::action(
        settings.get_str(room, "ai_service", "openai"),
        settings.get_str(room, "ai_model", "gpt-4o-mini"),
        settings.get_str(room, "ai_key", ""),
        prompt,
    )
}

/// Generate a conversational reply to `speaker: text` in `room`.
pub async fn generate_reply(
    ctx: &Arc<Context>,
    room: &str,
    speaker: &str,
    text: &str,
    include_history: bool,
) -> String {
    let settings = ctx.config.snapshot();
    let bot_nick = ctx.current_nick();
    let system = settings.get_str(room, "ai_prompt_default", DEFAULT_SYSTEM_PROMPT);

    let roster_block = if settings.get_bool(room, "ai_nicklist", false) {
        let roster = ctx.roster.lock().unwrap();
        Some(
            roster
                .members(room)
                .into_iter()
                .map(|m| m.nick)
                .filter(|nick| !irc_eq(nick, &bot_nick))
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let history = if include_history {
        ctx.history.tail(room, settings.chat_history(room))
    } else {
        Vec::new()
    };

    let prompt = build_prompt(
        &system,
        room,
        &bot_nick,
        roster_block.as_deref(),
        &history,
        Some((speaker, text)),
    );

    match ctx.llm.complete(chat_request(&settings, room, prompt)).await {
        Ok(reply) if !reply.is_empty() => reply,
        Ok(_) => FALLBACK_REPLY.to_string(),
        Err(e) => {
            error!(room, "reply generation failed: {}", e);
            FALLBACK_REPLY.to_string()
        }
    }
}

/// Generate a short action line (topic, kick reason, entrance) from the
/// prompt configured at `prompt_key`.
pub async fn generate_action(
    ctx: &Arc<Context>,
    room: &str,
    prompt_key: &str,
    fallback: &'static str,
) -> String {
    let settings = ctx.config.snapshot();
    let prompt = settings.get_str(room, prompt_key, default_action_prompt(prompt_key));
    match ctx.llm.complete(action_request(&settings, room, prompt)).await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => fallback.to_string(),
        Err(e) => {
            error!(room, prompt_key, "action generation failed: {}", e);
            fallback.to_string()
        }
    }
}

/// Uniform random delay from the configured `ai_delay` range.
fn pick_delay(settings: &Settings, room: &str) -> f64 {
    let (min, max) = settings.delay_range(room);
    if max <= 0.0 {
        return 0.0;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Generate and post a reply off-task: LLM call first, then the configured
/// delay, then emission.
pub fn spawn_reply(
    ctx: Arc<Context>,
    room: String,
    speaker: String,
    text: String,
    include_history: bool,
) {
    tokio::spawn(async move {
        let reply = generate_reply(&ctx, &room, &speaker, &text, include_history).await;
        let delay = pick_delay(&ctx.config.snapshot(), &room);
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
        ctx.send_channel_message(&room, &reply, true);
    });
}

/// Generate and post an entrance line after joining a room.
pub fn spawn_entrance(ctx: Arc<Context>, room: String) {
    tokio::spawn(async move {
        let text = generate_action(&ctx, &room, "ai_prompt_entrance", FALLBACK_ENTRANCE).await;
        ctx.send_channel_message(&room, &text, true);
    });
}
