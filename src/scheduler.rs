//! Per-room conversational scheduler and the room-presence watchdog.
//!
//! One cooperative loop evaluates every joined, non-sleeping room per wake
//! and sleeps until the earliest upcoming deadline (capped at 60 s): idle
//! chat, random moderator actions, and continuation speech. A separate
//! 30-second watchdog re-issues JOINs for configured rooms the bot has
//! fallen out of. Both loops yield to the reload pause gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::bot::Context;
use crate::casemap::irc_eq;
use crate::config::{RandomAction, Settings};
use crate::format::markdown_to_irc;
use crate::llm::{FALLBACK_KICK, FALLBACK_TOPIC};
use crate::message::Message;
use crate::reply;
use crate::state::RoomTimers;

/// Longest the scheduler sleeps between wakes.
pub const MAX_TICK_SLEEP: Duration = Duration::from_secs(60);
const MIN_TICK_SLEEP: Duration = Duration::from_millis(100);
/// Cadence of the room-presence watchdog.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Whether a room's continuation window is active: `ai_continue` on and
/// the bot was addressed within `ai_continue_mins`.
pub(crate) fn continuation_active(
    settings: &Settings,
    timers: &RoomTimers,
    room: &str,
    now: Instant,
) -> bool {
    if !settings.get_bool(room, "ai_continue", false) {
        return false;
    }
    let Some(last_trigger) = timers.last_trigger(room) else {
        return false;
    };
    let window = Duration::from_secs(settings.get_u64(room, "ai_continue_mins", 5) * 60);
    now.saturating_duration_since(last_trigger) <= window
}

/// The scheduler task.
pub async fn scheduler_loop(ctx: Arc<Context>) {
    let mut running = ctx.running_watch();
    while ctx.is_running() {
        ctx.pause.wait_resumed().await;
        let sleep_for = {
            let _busy = ctx.pause.enter();
            tick(&ctx, Instant::now())
        };
        tokio::select! {
            _ = tokio::time::sleep(sleep_for.clamp(MIN_TICK_SLEEP, MAX_TICK_SLEEP)) => {}
            _ = running.changed() => {}
        }
    }
}

/// Evaluate every room once; returns the time until the earliest upcoming
/// deadline.
pub fn tick(ctx: &Arc<Context>, now: Instant) -> Duration {
    let settings = ctx.config.snapshot();
    let bot_nick = ctx.current_nick();
    let mut next_wake = MAX_TICK_SLEEP;

    for channel in settings.channels() {
        let room = channel.name.as_str();
        if !ctx.roster.lock().unwrap().is_joined(room, &bot_nick) {
            continue;
        }
        if ctx.timers.lock().unwrap().is_sleeping(room, now) {
            continue;
        }

        if let Some(wait) = check_idle_chat(ctx, &settings, room, now) {
            next_wake = next_wake.min(wait);
        }
        if let Some(wait) = check_random_action(ctx, &settings, room, &bot_nick, now) {
            next_wake = next_wake.min(wait);
        }
        if let Some(wait) = check_continuation(ctx, &settings, room, now) {
            next_wake = next_wake.min(wait);
        }
    }

    next_wake
}

/// Idle chat: speak up when the room has been quiet long enough and the
/// bot was not the last speaker. Emitting resets the idle clock.
fn check_idle_chat(
    ctx: &Arc<Context>,
    settings: &Settings,
    room: &str,
    now: Instant,
) -> Option<Duration> {
    let interval = settings.get_u64(room, "idle_chat_interval", 0);
    if interval == 0 {
        return None;
    }
    let required = settings
        .get_u64(room, "idle_chat_time", interval)
        .max(interval);
    let threshold = Duration::from_secs(required);

    let last_chat = ctx.timers.lock().unwrap().last_chat(room).unwrap_or(now);
    let quiet = now.saturating_duration_since(last_chat);
    if quiet < threshold {
        return Some(threshold - quiet);
    }

    if ctx.was_last_speaker(room) {
        debug!(room, "skipping idle chat, bot was last speaker");
        return Some(threshold);
    }

    info!(room, quiet_secs = quiet.as_secs(), "emitting idle chat");
    ctx.timers.lock().unwrap().touch_chat(room, now);
    let include_history = settings.get_bool(room, "ai_context_idle", true);
    let prompt = settings.get_str(
        room,
        "ai_prompt_idle",
        "Say something interesting to get the conversation going.",
    );
    let bot_nick = ctx.current_nick();
    reply::spawn_reply(ctx.clone(), room.to_string(), bot_nick, prompt, include_history);
    Some(threshold)
}

/// Random moderator action: topic replacement or a playful kick, gated on
/// room quiet, op status, and the was-self-last rule.
fn check_random_action(
    ctx: &Arc<Context>,
    settings: &Settings,
    room: &str,
    bot_nick: &str,
    now: Instant,
) -> Option<Duration> {
    let interval = settings.get_u64(room, "random_action_interval", 0);
    if interval == 0 {
        return None;
    }
    let interval_d = Duration::from_secs(interval);

    let last_action = ctx.timers.lock().unwrap().last_action(room).unwrap_or(now);
    let elapsed = now.saturating_duration_since(last_action);
    if elapsed < interval_d {
        return Some(interval_d - elapsed);
    }

    let required = Duration::from_secs(settings.get_u64(room, "idle_chat_time", interval));
    let last_chat = ctx.timers.lock().unwrap().last_chat(room).unwrap_or(now);
    if now.saturating_duration_since(last_chat) < required {
        debug!(room, "skipping random action, channel not idle long enough");
        return Some(interval_d);
    }
    if !ctx.roster.lock().unwrap().member_flags(room, bot_nick).op {
        warn!(room, "skipping random action, bot is not opped");
        return Some(interval_d);
    }
    if ctx.was_last_speaker(room) {
        debug!(room, "skipping random action, bot was last speaker");
        return Some(interval_d);
    }

    let enabled = settings.random_actions(room);
    let Some(action) = enabled.choose(&mut rand::thread_rng()).copied() else {
        debug!(room, "no random actions enabled");
        return Some(interval_d);
    };

    ctx.timers.lock().unwrap().touch_action(room, now);
    match action {
        RandomAction::Topic => {
            info!(room, "random action: topic");
            let ctx = ctx.clone();
            let room = room.to_string();
            tokio::spawn(async move {
                let topic =
                    reply::generate_action(&ctx, &room, "ai_prompt_topic", FALLBACK_TOPIC).await;
                ctx.writer.send(Message::topic(&room, markdown_to_irc(&topic)));
            });
        }
        RandomAction::Kick => {
            let Some(target) = pick_kick_target(ctx, room, bot_nick) else {
                debug!(room, "random kick: no eligible target");
                return Some(interval_d);
            };
            info!(room, target = %target, "random action: kick");
            let ctx = ctx.clone();
            let room = room.to_string();
            tokio::spawn(async move {
                let reason =
                    reply::generate_action(&ctx, &room, "ai_prompt_kick", FALLBACK_KICK).await;
                ctx.writer
                    .send(Message::kick(&room, target, markdown_to_irc(&reason)));
            });
        }
    }
    Some(interval_d)
}

/// Uniformly pick a recent speaker who is still present, not the bot, and
/// not an op.
fn pick_kick_target(ctx: &Arc<Context>, room: &str, bot_nick: &str) -> Option<String> {
    let recent = ctx.history.recent_speakers(room, 20);
    let roster = ctx.roster.lock().unwrap();
    let eligible: Vec<String> = recent
        .into_iter()
        .filter(|nick| {
            roster.contains(room, nick)
                && !irc_eq(nick, bot_nick)
                && !roster.member_flags(room, nick).op
        })
        .collect();
    eligible.choose(&mut rand::thread_rng()).cloned()
}

/// Continuation speech: keep the conversation going after being addressed,
/// for as long as the trigger window holds.
fn check_continuation(
    ctx: &Arc<Context>,
    settings: &Settings,
    room: &str,
    now: Instant,
) -> Option<Duration> {
    let active = {
        let timers = ctx.timers.lock().unwrap();
        continuation_active(settings, &timers, room, now)
    };
    if !active {
        ctx.timers.lock().unwrap().clear_continuation(room);
        return None;
    }

    let deadline = ctx.timers.lock().unwrap().continuation(room)?;
    if now < deadline {
        return Some(deadline - now);
    }

    let freq = Duration::from_secs(settings.get_u64(room, "ai_continue_freq", 30));
    ctx.timers.lock().unwrap().set_continuation(room, now + freq);

    if ctx.was_last_speaker(room) {
        debug!(room, "continuation deadline while bot was last speaker, rescheduling");
        return Some(freq);
    }

    let Some(last_line) = ctx.history.last(room) else {
        return Some(freq);
    };
    let (speaker, text) = match last_line.split_once(": ") {
        Some((speaker, text)) => (speaker.to_string(), text.to_string()),
        None => return Some(freq),
    };

    info!(room, "continuation reply");
    reply::spawn_reply(ctx.clone(), room.to_string(), speaker, text, true);
    Some(freq)
}

/// The room-presence watchdog task.
pub async fn watchdog_loop(ctx: Arc<Context>) {
    let mut running = ctx.running_watch();
    while ctx.is_running() {
        ctx.pause.wait_resumed().await;
        {
            let _busy = ctx.pause.enter();
            check_rooms(&ctx);
        }
        tokio::select! {
            _ = tokio::time::sleep(WATCHDOG_INTERVAL) => {}
            _ = running.changed() => {}
        }
    }
}

/// Re-issue JOIN for every configured room the bot is not currently in.
pub fn check_rooms(ctx: &Arc<Context>) {
    if !ctx.session.lock().unwrap().registered() {
        return;
    }
    let settings = ctx.config.snapshot();
    let nick = ctx.current_nick();
    for channel in settings.channels() {
        if !ctx.roster.lock().unwrap().is_joined(&channel.name, &nick) {
            info!(channel = %channel.name, "not in configured channel, rejoining");
            ctx.writer
                .send(Message::join(&channel.name, channel.key.as_deref()));
        }
    }
}
