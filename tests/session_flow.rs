//! End-to-end protocol scenarios driven sans-socket: lines are fed through
//! the router and outbound traffic is observed on the writer queue.

mod common;

use common::{drain, feed, new_context, settle};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn registration_sets_usermode_and_joins_channels() {
    let (ctx, mut rx) = new_context(
        json!({
            "usermode": "+ix",
            "channels": [{"name": "#banter"}, {"name": "#quiet", "key": "sekrit"}]
        }),
        "ok",
    );

    let server = ctx.config.snapshot().config().servers[0].clone();
    ctx.send_registration(&server);
    assert_eq!(
        drain(&mut rx),
        vec!["NICK Quip", "USER quip 0 * :Quip Bot", "CAP END"]
    );

    feed(&ctx, &[":srv 001 Quip :welcome"]).await;
    assert_eq!(drain(&mut rx), vec!["MODE Quip +ix"]);

    feed(&ctx, &[":srv 376 Quip :End of MOTD"]).await;
    assert_eq!(drain(&mut rx), vec!["JOIN #banter", "JOIN #quiet sekrit"]);
}

#[tokio::test(start_paused = true)]
async fn post_connect_commands_substitute_nick() {
    let (ctx, mut rx) = new_context(
        json!({"post_connect_commands": ["PRIVMSG X@services :login $nick hunter2"]}),
        "ok",
    );
    feed(&ctx, &[":srv 001 Quip :welcome", ":srv 422 Quip :No MOTD"]).await;
    let out = drain(&mut rx);
    assert!(out.contains(&"PRIVMSG X@services :login Quip hunter2".to_string()));
    assert!(out.contains(&"JOIN #banter".to_string()));
}

#[tokio::test(start_paused = true)]
async fn nick_collision_walks_fallbacks() {
    let (ctx, mut rx) = new_context(json!({"nick": "Q", "altnick": "Q_"}), "ok");

    let server = ctx.config.snapshot().config().servers[0].clone();
    ctx.send_registration(&server);
    drain(&mut rx);

    feed(&ctx, &[":srv 433 * Q :Nickname is already in use"]).await;
    assert_eq!(drain(&mut rx), vec!["NICK Q_"]);

    feed(&ctx, &[":srv 433 * Q_ :Nickname is already in use"]).await;
    assert_eq!(drain(&mut rx), vec!["NICK Q_1"]);
    assert_eq!(ctx.current_nick(), "Q_1");

    // Post-registration collisions keep the current nick.
    feed(&ctx, &[":srv 001 Q_1 :welcome"]).await;
    drain(&mut rx);
    feed(&ctx, &[":srv 433 Q_1 Q :Nickname is already in use"]).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(ctx.current_nick(), "Q_1");
}

#[tokio::test(start_paused = true)]
async fn sasl_negotiation_round_trip() {
    let (ctx, mut rx) = new_context(
        json!({"sasl": {"enabled": true, "username": "quip", "password": "hunter2"}}),
        "ok",
    );

    let server = ctx.config.snapshot().config().servers[0].clone();
    ctx.send_registration(&server);
    assert_eq!(
        drain(&mut rx),
        vec!["CAP LS 302", "NICK Quip", "USER quip 0 * :Quip Bot"]
    );

    feed(&ctx, &[":srv CAP * LS :multi-prefix sasl=PLAIN"]).await;
    let out = drain(&mut rx);
    assert_eq!(out[0], "CAP REQ :sasl");
    assert_eq!(out[1], "AUTHENTICATE PLAIN");
    assert!(out[2].starts_with("AUTHENTICATE "));

    feed(&ctx, &[":srv 903 Quip :SASL authentication successful"]).await;
    assert_eq!(drain(&mut rx), vec!["CAP END"]);
}

#[tokio::test(start_paused = true)]
async fn sasl_failure_continues_unauthenticated() {
    let (ctx, mut rx) = new_context(
        json!({"sasl": {"enabled": true, "username": "quip", "password": "wrong"}}),
        "ok",
    );
    feed(&ctx, &[":srv 904 Quip :SASL authentication failed"]).await;
    assert_eq!(drain(&mut rx), vec!["CAP END"]);
}

#[tokio::test(start_paused = true)]
async fn ping_answered_without_dispatch() {
    let (ctx, mut rx) = new_context(json!({}), "ok");
    feed(&ctx, &["PING :irc.example.net"]).await;
    assert_eq!(drain(&mut rx), vec!["PONG :irc.example.net"]);
}

#[tokio::test(start_paused = true)]
async fn direct_address_replies_and_updates_trigger() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "hello, alice");

    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip: hi"]).await;
    settle().await;

    let out = drain(&mut rx);
    assert_eq!(out, vec!["PRIVMSG #r :hello, alice"]);
    {
        let timers = ctx.timers.lock().unwrap();
        assert!(timers.last_trigger("#r").is_some());
        assert!(timers.last_bot("#r").is_some());
    }
    // The bot's reply entered the chat log.
    assert_eq!(
        ctx.history.last("#r").as_deref(),
        Some("Quip: hello, alice")
    );
}

#[tokio::test(start_paused = true)]
async fn mention_replies_only_when_enabled() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "heard you");
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;

    feed(&ctx, &[":alice!a@h PRIVMSG #r :is Quip around?"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    let (ctx, mut rx) = new_context(
        json!({"ai_mention": true, "channels": [{"name": "#r"}]}),
        "heard you",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    feed(&ctx, &[":alice!a@h PRIVMSG #r :is Quip around?"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["PRIVMSG #r :heard you"]);

    // Substrings of other words are not mentions.
    feed(&ctx, &[":alice!a@h PRIVMSG #r :quipping is fun"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn non_direct_reply_suppressed_when_bot_was_last_speaker() {
    let (ctx, mut rx) = new_context(
        json!({"ai_mention": true, "channels": [{"name": "#r"}]}),
        "echo",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    ctx.history.append("#r", "Quip", "still here", 20);

    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip is quiet today"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    // Direct address always replies, even right after the bot spoke.
    ctx.history.append("#r", "Quip", "still here", 20);
    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip: you there?"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["PRIVMSG #r :echo"]);
}

#[tokio::test(start_paused = true)]
async fn channel_flood_bans_kicks_then_suppresses() {
    let (ctx, mut rx) = new_context(
        json!({"channels": [{
            "name": "#r",
            "floodpro": {"lines": 3, "seconds": 5, "ban_time": 1}
        }]}),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;

    feed(
        &ctx,
        &[
            ":x!u@h PRIVMSG #r :one",
            ":x!u@h PRIVMSG #r :two",
            ":x!u@h PRIVMSG #r :three",
        ],
    )
    .await;
    settle().await;
    let out = drain(&mut rx);
    assert_eq!(
        out,
        vec![
            "MODE #r +b *!*@h",
            "KICK #r x :Flood protection - banned for 1 minutes"
        ]
    );
    // Two lines made it into history before the detector tripped.
    assert_eq!(ctx.history.tail("#r", 10).len(), 2);

    // Same host, different nick: still suppressed.
    feed(&ctx, &[":x2!u@h PRIVMSG #r :four"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(ctx.history.tail("#r", 10).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn roster_sync_from_names_and_whox() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "ok");
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":srv 353 Quip = #r :@alice +bob carol"]).await;
    feed(&ctx, &[":srv 366 Quip #r :End of /NAMES list."]).await;
    assert_eq!(drain(&mut rx), vec!["WHO #r %tnuhiraf"]);

    feed(
        &ctx,
        &[":srv 354 Quip 152 aident ahost 1.2.3.4 alice H@ svc-alice :Alice A"],
    )
    .await;

    let roster = ctx.roster.lock().unwrap();
    assert!(roster.member_flags("#r", "alice").op);
    assert!(roster.member_flags("#r", "bob").voice);
    let user = roster.user("alice").unwrap();
    assert_eq!(user.ident.as_deref(), Some("aident"));
    assert_eq!(user.host.as_deref(), Some("ahost"));
    assert_eq!(user.ip.as_deref(), Some("1.2.3.4"));
    assert_eq!(user.account.as_deref(), Some("svc-alice"));
}

#[tokio::test(start_paused = true)]
async fn user_join_triggers_single_whox() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "ok");
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":dave!d@dh JOIN :#r"]).await;
    assert_eq!(drain(&mut rx), vec!["WHO dave %tnuhiraf"]);
    assert!(ctx.roster.lock().unwrap().contains("#r", "dave"));
}

#[tokio::test(start_paused = true)]
async fn kick_and_invite_lifecycle() {
    let (ctx, mut rx) = new_context(
        json!({"channels": [{"name": "#r", "key": "k3y"}]}),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    feed(&ctx, &[":dave!d@dh JOIN :#r"]).await;
    drain(&mut rx);

    // Someone else kicked: member entry goes away.
    feed(&ctx, &[":op!o@oh KICK #r dave :bye"]).await;
    assert!(!ctx.roster.lock().unwrap().contains("#r", "dave"));

    // Bot kicked: room entry dropped; invite back is honored with the key.
    feed(&ctx, &[":op!o@oh KICK #r Quip :out"]).await;
    assert!(!ctx
        .roster
        .lock()
        .unwrap()
        .is_joined("#r", &ctx.current_nick()));
    feed(&ctx, &[":op!o@oh INVITE Quip :#r"]).await;
    assert_eq!(drain(&mut rx), vec!["JOIN #r k3y"]);

    // Invites to unconfigured channels are ignored.
    feed(&ctx, &[":op!o@oh INVITE Quip :#elsewhere"]).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn mode_changes_update_flags() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "ok");
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r", ":alice!a@h JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":op!o@oh MODE #r +ov alice alice"]).await;
    {
        let roster = ctx.roster.lock().unwrap();
        let flags = roster.member_flags("#r", "alice");
        assert!(flags.op);
        assert!(flags.voice);
    }

    // Parametric modes consume their arguments in order.
    feed(&ctx, &[":op!o@oh MODE #r +b-o *!*@spam.host alice"]).await;
    let roster = ctx.roster.lock().unwrap();
    assert!(!roster.member_flags("#r", "alice").op);
    assert!(roster.member_flags("#r", "alice").voice);
}

#[tokio::test(start_paused = true)]
async fn ctcp_version_and_ping_answered_via_notice() {
    let (ctx, mut rx) = new_context(json!({}), "ok");

    feed(&ctx, &[":alice!a@h PRIVMSG Quip :\u{1}VERSION\u{1}"]).await;
    let out = drain(&mut rx);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("NOTICE alice :\u{1}VERSION banter"));

    feed(&ctx, &[":alice!a@h PRIVMSG Quip :\u{1}PING 12345\u{1}"]).await;
    assert_eq!(drain(&mut rx), vec!["NOTICE alice :\u{1}PING 12345\u{1}"]);
}

#[tokio::test(start_paused = true)]
async fn ignored_nicks_and_patterns_drop_messages() {
    let (ctx, mut rx) = new_context(
        json!({
            "ignore_nicks": ["spammer"],
            "ignore_regex": ["(?i)buy now"],
            "channels": [{"name": "#r"}]
        }),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":Spammer!s@h PRIVMSG #r :Quip: hi"]).await;
    feed(&ctx, &[":alice!a@h PRIVMSG #r :BUY NOW cheap flags"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());
    assert!(ctx.history.is_empty("#r"));
}

#[tokio::test(start_paused = true)]
async fn command_dispatch_respects_enabled_and_permissions() {
    let (ctx, mut rx) = new_context(
        json!({
            "commands": {
                "die": {"requires": "admin"},
                "wake": {"enabled": true}
            },
            "channels": [
                {"name": "#r"},
                {"name": "#locked", "commands": {"say": {"enabled": false}}}
            ]
        }),
        "ok",
    );
    feed(
        &ctx,
        &[":Quip!quip@bot.host JOIN :#r", ":Quip!quip@bot.host JOIN :#locked"],
    )
    .await;
    feed(&ctx, &[":alice!a@h JOIN :#r", ":alice!a@h JOIN :#locked"]).await;
    drain(&mut rx);

    // Enabled + authorized: handler output is posted.
    feed(&ctx, &[":alice!a@h PRIVMSG #r :!say hello world"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["PRIVMSG #r :hello world"]);

    // Disabled in this channel only: silence.
    feed(&ctx, &[":alice!a@h PRIVMSG #locked :!say hello"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    // Admin-only command from a non-admin: silence.
    feed(&ctx, &[":alice!a@h PRIVMSG #r :!die"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());
    assert!(ctx.is_running());

    // Unknown command: silence.
    feed(&ctx, &[":alice!a@h PRIVMSG #r :!frobnicate"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    // Commands never enter the chat log.
    assert!(ctx.history.is_empty("#r"));
}

#[tokio::test(start_paused = true)]
async fn admin_die_shuts_down() {
    let (ctx, mut rx) = new_context(
        json!({
            "admins": ["alice"],
            "commands": {"die": {"requires": "admin"}},
            "channels": [{"name": "#r"}]
        }),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r", ":alice!a@h JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":alice!a@h PRIVMSG #r :!die so long"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["QUIT :so long"]);
    assert!(!ctx.is_running());
}

#[tokio::test(start_paused = true)]
async fn sleep_and_wake_gate_replies() {
    let (ctx, mut rx) = new_context(json!({"channels": [{"name": "#r"}]}), "zzz");
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r", ":alice!a@h JOIN :#r"]).await;
    drain(&mut rx);

    feed(&ctx, &[":alice!a@h PRIVMSG #r :!sleep 5"]).await;
    settle().await;
    let out = drain(&mut rx);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("PRIVMSG #r :Going to sleep for 5 minutes"));

    // Direct address during sleep: no generated reply.
    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip: hello?"]).await;
    settle().await;
    assert!(drain(&mut rx).is_empty());

    feed(&ctx, &[":alice!a@h PRIVMSG #r :!wake"]).await;
    settle().await;
    assert_eq!(
        drain(&mut rx),
        vec!["PRIVMSG #r :I'm awake! Ready to chat again."]
    );

    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip: hello again"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["PRIVMSG #r :zzz"]);
}
