//! Inbound line routing: the protocol state machine and the channel
//! message pipeline.
//!
//! Lines arrive from the reader in order and are dispatched here.
//! Registration, capability negotiation, SASL, nickname collision
//! recovery, and roster synchronization mutate the shared state; channel
//! traffic runs the ignore → flood → command → history → reply pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, error, info, trace, warn};

use crate::access::authorize;
use crate::bot::Context;
use crate::casemap::{irc_eq, irc_to_lower};
use crate::commands::{CommandRequest, Reply};
use crate::config::Settings;
use crate::flood::FloodVerdict;
use crate::message::{is_channel_name, Message};
use crate::prefix::Prefix;
use crate::reply;
use crate::sasl;
use crate::state::ConnectionState;

/// Pause between post-connect commands.
const REGISTRATION_PACING: Duration = Duration::from_secs(1);

/// Process one inbound line.
pub async fn handle_line(ctx: &Arc<Context>, line: &str) {
    trace!(target: "raw", "<<< {}", line);

    // PING is answered before anything else and never dispatched.
    if let Some(payload) = line.strip_prefix("PING") {
        ctx.writer.send_raw(format!("PONG{}", payload));
        return;
    }

    let msg: Message = match line.parse() {
        Ok(msg) => msg,
        Err(e) => {
            debug!("skipping unparsable line: {}", e);
            return;
        }
    };

    if let Some(prefix) = &msg.prefix {
        ctx.roster.lock().unwrap().note_prefix(prefix);
    }

    if msg.is_numeric() {
        handle_numeric(ctx, &msg).await;
        return;
    }

    match msg.command.to_ascii_uppercase().as_str() {
        "CAP" => handle_cap(ctx, &msg),
        "AUTHENTICATE" => handle_authenticate(ctx, &msg),
        "PRIVMSG" => handle_privmsg(ctx, &msg).await,
        "JOIN" => handle_join(ctx, &msg),
        "PART" => handle_part(ctx, &msg),
        "QUIT" => handle_quit(ctx, &msg),
        "NICK" => handle_nick(ctx, &msg),
        "MODE" => handle_mode(ctx, &msg),
        "INVITE" => handle_invite(ctx, &msg),
        "KICK" => handle_kick(ctx, &msg),
        "ERROR" => error!("server error: {}", msg.text().unwrap_or("")),
        other => trace!(command = other, "unhandled command"),
    }
}

async fn handle_numeric(ctx: &Arc<Context>, msg: &Message) {
    match msg.command.as_str() {
        "001" => on_welcome(ctx),
        "376" | "422" => on_motd_end(ctx).await,
        "433" => on_nick_in_use(ctx),
        "903" => {
            info!("SASL authentication successful");
            ctx.session.lock().unwrap().sasl_authenticated = true;
            ctx.writer.send_raw("CAP END");
        }
        "904" => {
            error!("SASL authentication failed");
            ctx.writer.send_raw("CAP END");
        }
        "905" => {
            error!("SASL authentication failed: message too long");
            ctx.writer.send_raw("CAP END");
        }
        "906" => {
            error!("SASL authentication aborted");
            ctx.writer.send_raw("CAP END");
        }
        "907" => {
            warn!("SASL authentication failed: already authenticated");
            ctx.writer.send_raw("CAP END");
        }
        "353" => on_names(ctx, msg),
        "366" => on_names_end(ctx, msg),
        "352" => on_who(ctx, msg),
        "354" => on_whox(ctx, msg),
        "315" => debug!(channel = msg.param(1).unwrap_or(""), "end of WHO list"),
        code => {
            if let Ok(n) = code.parse::<u16>() {
                if (400..600).contains(&n) {
                    error!("server error reply: {}", msg);
                    return;
                }
            }
            trace!(numeric = code, "unhandled numeric");
        }
    }
}

fn on_welcome(ctx: &Arc<Context>) {
    {
        let mut session = ctx.session.lock().unwrap();
        if session.registered() {
            return;
        }
        session.state = ConnectionState::Registered;
    }
    let settings = ctx.config.snapshot();
    if let Some(usermode) = settings
        .config()
        .usermode
        .as_deref()
        .filter(|m| !m.is_empty())
    {
        let nick = ctx.current_nick();
        info!(usermode, "setting user mode");
        ctx.writer.send_raw(format!("MODE {} {}", nick, usermode));
    }
}

async fn on_motd_end(ctx: &Arc<Context>) {
    if !ctx.session.lock().unwrap().registered() {
        return;
    }
    let settings = ctx.config.snapshot();
    let nick = ctx.current_nick();
    for command in &settings.config().post_connect_commands {
        let command = command.replace("$nick", &nick);
        debug!(command = %command, "post-connect command");
        ctx.writer.send_raw(command);
        tokio::time::sleep(REGISTRATION_PACING).await;
    }

    info!("registration complete, joining channels");
    for channel in settings.channels() {
        ctx.writer
            .send(Message::join(&channel.name, channel.key.as_deref()));
    }
}

fn on_nick_in_use(ctx: &Arc<Context>) {
    let settings = ctx.config.snapshot();
    let mut session = ctx.session.lock().unwrap();
    if session.registered() {
        // A reclaim attempt failed; keep what we have.
        debug!(
            current = %session.current_nick,
            "primary nickname still unavailable"
        );
        return;
    }
    let primary = &settings.config().nick;
    let alt = settings.config().altnick();
    if irc_eq(&session.current_nick, primary) {
        session.current_nick = alt;
    } else {
        session.nick_attempt += 1;
        session.current_nick = format!("{}{}", alt, session.nick_attempt);
    }
    info!(nick = %session.current_nick, "nickname in use, trying fallback");
    ctx.writer.send_raw(format!("NICK {}", session.current_nick));
}

fn handle_cap(ctx: &Arc<Context>, msg: &Message) {
    match msg.param(1).unwrap_or("") {
        "LS" => {
            let advertised = msg.text().unwrap_or("");
            let has_sasl = advertised.split_whitespace().any(|cap| {
                let cap = cap.to_ascii_lowercase();
                cap == "sasl" || cap.starts_with("sasl=")
            });
            if has_sasl && ctx.config.snapshot().config().sasl.enabled {
                begin_sasl(ctx);
            } else {
                ctx.writer.send_raw("CAP END");
            }
        }
        // The AUTHENTICATE exchange is already under way.
        "ACK" => {}
        "NAK" => {
            warn!("capability request rejected");
            ctx.writer.send_raw("CAP END");
        }
        _ => {}
    }
}

fn begin_sasl(ctx: &Arc<Context>) {
    let settings = ctx.config.snapshot();
    let cfg = settings.config();
    let username = cfg
        .sasl
        .username
        .clone()
        .unwrap_or_else(|| cfg.nick.clone());
    let Some(password) = cfg.sasl.password.clone().filter(|p| !p.is_empty()) else {
        warn!("SASL enabled but no password configured");
        ctx.writer.send_raw("CAP END");
        return;
    };
    ctx.writer.send_raw("CAP REQ :sasl");
    ctx.writer.send_raw("AUTHENTICATE PLAIN");
    send_sasl_payload(ctx, &username, &password);
}

fn send_sasl_payload(ctx: &Arc<Context>, username: &str, password: &str) {
    let encoded = sasl::encode_plain(username, password);
    for fragment in sasl::auth_fragments(&encoded) {
        ctx.writer.send_raw(format!("AUTHENTICATE {}", fragment));
    }
}

fn handle_authenticate(ctx: &Arc<Context>, msg: &Message) {
    // `AUTHENTICATE +`: the server is ready for credentials.
    if msg.text() == Some("+") {
        let settings = ctx.config.snapshot();
        let cfg = settings.config();
        if !cfg.sasl.enabled {
            return;
        }
        let username = cfg
            .sasl
            .username
            .clone()
            .unwrap_or_else(|| cfg.nick.clone());
        let password = cfg.sasl.password.clone().unwrap_or_default();
        send_sasl_payload(ctx, &username, &password);
    }
}

async fn handle_privmsg(ctx: &Arc<Context>, msg: &Message) {
    let Some(prefix) = msg.prefix.clone() else {
        return;
    };
    let Some(target) = msg.param(0).map(str::to_string) else {
        return;
    };
    let Some(text) = msg.trailing.clone() else {
        return;
    };

    if text.starts_with('\u{1}') {
        handle_ctcp(ctx, &prefix.nick, &text).await;
        return;
    }

    if is_channel_name(&target) {
        if !ctx
            .roster
            .lock()
            .unwrap()
            .is_joined(&target, &ctx.current_nick())
        {
            return;
        }
        handle_channel_message(ctx, &prefix, &target, &text).await;
    } else {
        handle_private_message(ctx, &prefix, &text);
    }
}

/// The channel PRIVMSG pipeline: ignore filters, flood accounting,
/// command dispatch, history, clocks, then reply selection.
async fn handle_channel_message(ctx: &Arc<Context>, prefix: &Prefix, room: &str, text: &str) {
    let settings = ctx.config.snapshot();
    let nick = prefix.nick.as_str();
    let now = Instant::now();

    // Ignore filters run before flood accounting: an ignored speaker never
    // accrues flood state.
    if settings.ignore_nicks(room).iter().any(|n| irc_eq(n, nick)) {
        info!(room, nick, "ignored message (ignore_nicks)");
        return;
    }
    for pattern in settings.ignore_regex(room) {
        match Regex::new(&pattern) {
            Ok(re) => {
                if re.is_match(text) {
                    info!(room, nick, pattern = %pattern, "ignored message (ignore_regex)");
                    return;
                }
            }
            Err(e) => error!(pattern = %pattern, "invalid ignore_regex: {}", e),
        }
    }

    let host = {
        let roster = ctx.roster.lock().unwrap();
        roster
            .user(nick)
            .and_then(|u| u.host.clone())
            .or_else(|| prefix.host.clone())
    };
    let is_op = ctx.roster.lock().unwrap().member_flags(room, nick).op;
    let verdict = ctx.flood.check_channel(
        room,
        nick,
        host.as_deref(),
        settings.channel_flood(room).as_ref(),
        is_op,
        ctx.is_admin(nick),
        now,
    );
    match verdict {
        FloodVerdict::Suppressed => return,
        FloodVerdict::Flooded { actions } => {
            for action in actions {
                ctx.writer.send_raw(action);
            }
            return;
        }
        FloodVerdict::Clean => {}
    }

    // Command dispatch; commands never enter the chat log.
    let cmd_prefix = settings.cmd_prefix(room);
    if !cmd_prefix.is_empty() {
        if let Some(rest) = text.strip_prefix(cmd_prefix.as_str()) {
            let mut parts = rest.split_whitespace();
            if let Some(name) = parts.next() {
                let req = CommandRequest {
                    nick: nick.to_string(),
                    channel: room.to_string(),
                    args: parts.map(str::to_string).collect(),
                };
                dispatch_command(ctx, &name.to_lowercase(), req).await;
            }
            return;
        }
    }

    let bot_nick = ctx.current_nick();
    // Captured before the append so it reflects the entry previous to this
    // message.
    let bot_was_last = ctx.was_last_speaker(room);

    ctx.history
        .append(room, nick, text, settings.chat_history(room));

    if irc_eq(nick, &bot_nick) {
        return;
    }
    ctx.timers.lock().unwrap().touch_chat(room, now);

    if ctx.timers.lock().unwrap().is_sleeping(room, now) {
        debug!(room, "sleeping, not replying");
        return;
    }

    let is_direct = irc_to_lower(text).starts_with(&format!("{}:", irc_to_lower(&bot_nick)));

    if !is_direct && bot_was_last {
        debug!(room, "bot was last speaker, staying quiet");
        return;
    }

    if is_direct {
        update_trigger(ctx, &settings, room, now);
        let include_history = settings.get_bool(room, "ai_context_direct", false);
        reply::spawn_reply(
            ctx.clone(),
            room.to_string(),
            nick.to_string(),
            text.to_string(),
            include_history,
        );
        return;
    }

    if settings.get_bool(room, "ai_mention", false) && contains_bare_word(text, &bot_nick) {
        update_trigger(ctx, &settings, room, now);
        info!(room, nick, "bot mentioned");
        let include_history = settings.get_bool(room, "ai_context_mention", true);
        reply::spawn_reply(
            ctx.clone(),
            room.to_string(),
            nick.to_string(),
            text.to_string(),
            include_history,
        );
    }
}

/// Whether `nick` appears as a bare word in `text`.
fn contains_bare_word(text: &str, nick: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || "[]{}\\|^_`-".contains(c)))
        .any(|word| irc_eq(word, nick))
}

/// Record being addressed and arm the continuation timer.
fn update_trigger(ctx: &Arc<Context>, settings: &Settings, room: &str, now: Instant) {
    let mut timers = ctx.timers.lock().unwrap();
    timers.touch_trigger(room, now);
    if settings.get_bool(room, "ai_continue", false) {
        let freq = settings.get_u64(room, "ai_continue_freq", 30);
        timers.set_continuation(room, now + Duration::from_secs(freq));
        debug!(room, freq, "scheduled continuation");
    }
}

async fn dispatch_command(ctx: &Arc<Context>, name: &str, req: CommandRequest) {
    let Some(cmd) = ctx.commands.read().unwrap().get(name) else {
        return;
    };
    let settings = ctx.config.snapshot();
    let cmd_config = settings.command_config(&req.channel, name);
    if !cmd_config.enabled {
        warn!(command = name, channel = %req.channel, "command disabled");
        return;
    }

    let flags = ctx
        .roster
        .lock()
        .unwrap()
        .member_flags(&req.channel, &req.nick);
    if !authorize(
        cmd_config.requires,
        ctx.is_admin(&req.nick),
        flags.op,
        flags.voice,
    ) {
        warn!(
            command = name,
            nick = %req.nick,
            channel = %req.channel,
            "permission denied"
        );
        return;
    }

    debug!(command = name, nick = %req.nick, channel = %req.channel, "dispatching command");
    match cmd.execute(ctx, &req).await {
        Ok(Reply::None) => {}
        Ok(Reply::Say {
            text,
            add_to_history,
        }) => ctx.send_channel_message(&req.channel, &text, add_to_history),
        Err(e) => {
            error!(command = name, "command failed: {}", e);
            ctx.send_channel_message(
                &req.channel,
                &format!("Error executing command: {}", e),
                false,
            );
        }
    }
}

fn handle_private_message(ctx: &Arc<Context>, prefix: &Prefix, text: &str) {
    let settings = ctx.config.snapshot();
    let verdict = ctx.flood.check_private(
        &prefix.nick,
        settings.private_flood().as_ref(),
        ctx.is_admin(&prefix.nick),
        Instant::now(),
    );
    if verdict != FloodVerdict::Clean {
        return;
    }

    let nick = prefix.nick.clone();
    let text = text.to_string();
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let response = reply::generate_reply(&ctx, "", &nick, &text, false).await;
        let formatted = crate::format::markdown_to_irc(&response);
        for chunk in crate::format::split_message(&formatted, &nick) {
            ctx.writer.send(Message::notice(&nick, chunk));
        }
    });
}

async fn handle_ctcp(ctx: &Arc<Context>, nick: &str, payload: &str) {
    let settings = ctx.config.snapshot();
    let verdict = ctx.flood.check_private(
        nick,
        settings.private_flood().as_ref(),
        ctx.is_admin(nick),
        Instant::now(),
    );
    if verdict != FloodVerdict::Clean {
        warn!(nick, "dropping CTCP request (flood protection)");
        return;
    }

    let inner = payload.trim_matches('\u{1}');
    let (kind, args) = match inner.split_once(' ') {
        Some((kind, args)) => (kind, Some(args)),
        None => (inner, None),
    };

    let respond = |body: String| {
        ctx.writer
            .send(Message::notice(nick, format!("\u{1}{}\u{1}", body)));
    };

    match kind.to_ascii_uppercase().as_str() {
        "VERSION" => {
            info!(nick, "CTCP VERSION request");
            respond(format!(
                "VERSION banter v{} - an AI resident for IRC",
                env!("CARGO_PKG_VERSION")
            ));
        }
        "PING" => {
            info!(nick, "CTCP PING request");
            match args {
                Some(token) => respond(format!("PING {}", token)),
                None => respond("PING".to_string()),
            }
        }
        "TIME" => {
            info!(nick, "CTCP TIME request");
            respond(format!("TIME {}", chrono::Local::now().to_rfc2822()));
        }
        "USERINFO" => {
            info!(nick, "CTCP USERINFO request");
            respond(format!(
                "USERINFO {} is a witty AI resident",
                ctx.current_nick()
            ));
        }
        "CLIENTINFO" => {
            info!(nick, "CTCP CLIENTINFO request");
            respond("CLIENTINFO ACTION CLIENTINFO PING SOURCE TIME USERINFO VERSION".to_string());
        }
        "SOURCE" => {
            info!(nick, "CTCP SOURCE request");
            respond(format!("SOURCE {}", env!("CARGO_PKG_REPOSITORY")));
        }
        "ACTION" => {
            if let Some(action) = args {
                respond(format!("ACTION {}", action));
            }
        }
        other => warn!(nick, kind = other, "unknown CTCP request"),
    }
}

fn handle_join(ctx: &Arc<Context>, msg: &Message) {
    let Some(prefix) = &msg.prefix else {
        return;
    };
    let Some(channel) = msg.text().map(str::to_string) else {
        return;
    };
    let nick = prefix.nick.as_str();
    let bot_nick = ctx.current_nick();

    if irc_eq(nick, &bot_nick) {
        info!(channel = %channel, nick = %bot_nick, "joined channel");
        ctx.roster.lock().unwrap().reset_room(&channel, &bot_nick);
        ctx.timers
            .lock()
            .unwrap()
            .init_room(&channel, Instant::now());
        if ctx
            .config
            .snapshot()
            .get_bool(&channel, "ai_entrance", false)
        {
            reply::spawn_entrance(ctx.clone(), channel);
        }
    } else {
        info!(channel = %channel, nick, "user joined");
        ctx.roster.lock().unwrap().join(&channel, nick);
        // Single-user WHOX for complete metadata.
        ctx.writer.send_raw(format!("WHO {} %tnuhiraf", nick));
    }
}

fn handle_part(ctx: &Arc<Context>, msg: &Message) {
    let Some(prefix) = &msg.prefix else {
        return;
    };
    let Some(channel) = msg.param(0).or(msg.trailing.as_deref()) else {
        return;
    };
    if irc_eq(&prefix.nick, &ctx.current_nick()) {
        info!(channel, "left channel");
        ctx.roster.lock().unwrap().remove_room(channel);
    } else {
        info!(channel, nick = %prefix.nick, "user left");
        ctx.roster.lock().unwrap().part(channel, &prefix.nick);
    }
}

fn handle_quit(ctx: &Arc<Context>, msg: &Message) {
    let Some(prefix) = &msg.prefix else {
        return;
    };
    info!(nick = %prefix.nick, "user quit");
    ctx.roster.lock().unwrap().quit(&prefix.nick);
}

fn handle_nick(ctx: &Arc<Context>, msg: &Message) {
    let Some(prefix) = &msg.prefix else {
        return;
    };
    let Some(new_nick) = msg.text().map(str::to_string) else {
        return;
    };
    let old_nick = prefix.nick.as_str();

    {
        let mut session = ctx.session.lock().unwrap();
        if irc_eq(old_nick, &session.current_nick) {
            let configured = ctx.config.snapshot().config().nick.clone();
            if irc_eq(&new_nick, &configured) {
                info!(nick = %new_nick, "recovered primary nickname");
            } else {
                debug!(from = old_nick, to = %new_nick, "own nickname changed");
            }
            session.current_nick = new_nick.clone();
        }
    }

    info!(from = old_nick, to = %new_nick, "nick change");
    ctx.roster.lock().unwrap().rename(old_nick, &new_nick);
}

fn handle_mode(ctx: &Arc<Context>, msg: &Message) {
    let Some(channel) = msg.param(0).map(str::to_string) else {
        return;
    };
    if !is_channel_name(&channel) {
        return;
    }
    let Some(modes) = msg.param(1).map(str::to_string) else {
        return;
    };
    let params: Vec<String> = msg.params.iter().skip(2).cloned().collect();

    let mut adding = true;
    let mut param_index = 0;
    for mode in modes.chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            'o' | 'v' => {
                if let Some(target) = params.get(param_index) {
                    ctx.roster
                        .lock()
                        .unwrap()
                        .set_mode_flag(&channel, target, mode, adding);
                    info!(
                        channel = %channel,
                        target = %target,
                        mode = %mode,
                        adding,
                        "privilege change"
                    );
                }
                param_index += 1;
            }
            // Parametric channel modes we observe but do not track.
            'b' | 'k' | 'l' => param_index += 1,
            other => debug!(channel = %channel, mode = %other, "channel mode ignored"),
        }
    }
}

fn handle_invite(ctx: &Arc<Context>, msg: &Message) {
    let Some(target) = msg.param(0) else {
        return;
    };
    if !irc_eq(target, &ctx.current_nick()) {
        return;
    }
    let Some(channel) = msg.param(1).or(msg.trailing.as_deref()) else {
        return;
    };

    let settings = ctx.config.snapshot();
    match settings.channel(channel) {
        Some(chan) => {
            if ctx
                .roster
                .lock()
                .unwrap()
                .is_joined(channel, &ctx.current_nick())
            {
                debug!(channel, "ignoring invite, already present");
            } else {
                info!(channel, "accepting invite to configured channel");
                ctx.writer
                    .send(Message::join(&chan.name, chan.key.as_deref()));
            }
        }
        None => debug!(channel, "ignoring invite to unconfigured channel"),
    }
}

fn handle_kick(ctx: &Arc<Context>, msg: &Message) {
    let Some(channel) = msg.param(0) else {
        return;
    };
    let Some(kicked) = msg.param(1) else {
        return;
    };
    if irc_eq(kicked, &ctx.current_nick()) {
        warn!(channel, "bot was kicked from channel");
        ctx.roster.lock().unwrap().remove_room(channel);
    } else {
        info!(channel, nick = kicked, "user was kicked");
        ctx.roster.lock().unwrap().part(channel, kicked);
    }
}

fn on_names(ctx: &Arc<Context>, msg: &Message) {
    // :srv 353 me = #room :@alice +bob carol
    let Some(channel) = msg.params.last().map(String::as_str) else {
        return;
    };
    let Some(names) = msg.trailing.as_deref() else {
        return;
    };
    debug!(channel, "NAMES reply");
    let mut roster = ctx.roster.lock().unwrap();
    for token in names.split_whitespace() {
        roster.apply_names_token(channel, token);
    }
}

fn on_names_end(ctx: &Arc<Context>, msg: &Message) {
    // :srv 366 me #room :End of /NAMES list.
    let Some(channel) = msg.param(1) else {
        return;
    };
    debug!(channel, "end of NAMES, requesting WHOX");
    ctx.writer.send_raw(format!("WHO {} %tnuhiraf", channel));
}

fn on_who(ctx: &Arc<Context>, msg: &Message) {
    // :srv 352 me #room ident host server nick H@ :0 Real Name
    let p = &msg.params;
    if p.len() < 7 {
        return;
    }
    let realname = msg
        .trailing
        .as_deref()
        .and_then(|t| t.split_once(' ').map(|(_, rest)| rest))
        .unwrap_or("");
    ctx.roster
        .lock()
        .unwrap()
        .apply_who(&p[1], &p[2], &p[3], &p[5], &p[6], realname);
}

fn on_whox(ctx: &Arc<Context>, msg: &Message) {
    // :srv 354 me token ident host ip nick flags account :Real Name
    let p = &msg.params;
    if p.len() < 8 {
        return;
    }
    let realname = msg.trailing.as_deref().unwrap_or("");
    ctx.roster
        .lock()
        .unwrap()
        .apply_whox(&p[2], &p[3], &p[4], &p[5], &p[6], &p[7], realname);
}
