//! Hot reload against a live context: state preservation, new settings
//! taking effect, revert on bad configuration.

mod common;

use std::time::{Duration, Instant};

use banter::error::BotError;
use banter::{reload, Config};
use common::{drain, feed, merged_config, new_context, settle};
use serde_json::json;

fn config_with(overrides: serde_json::Value) -> Config {
    serde_json::from_value(merged_config(overrides)).expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn reload_preserves_state_and_applies_settings() {
    let (ctx, mut rx) = new_context(
        json!({
            "admins": ["alice"],
            "idle_chat_interval": 300,
            "channels": [{"name": "#r"}]
        }),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r", ":alice!a@h JOIN :#r"]).await;
    feed(&ctx, &[":alice!a@h PRIVMSG #r :remember this"]).await;
    settle().await;
    drain(&mut rx);

    assert!(ctx.is_admin("alice"));

    let new_config = config_with(json!({
        "admins": [],
        "idle_chat_interval": 60,
        "channels": [{"name": "#r"}]
    }));
    reload::apply(&ctx, new_config, true).await.unwrap();

    // Roster, chat log, and timers survived the swap.
    assert!(ctx.roster.lock().unwrap().contains("#r", "alice"));
    assert_eq!(
        ctx.history.last("#r").as_deref(),
        Some("alice: remember this")
    );
    assert!(ctx.timers.lock().unwrap().last_chat("#r").is_some());

    // New settings are live and the admin memo cache was invalidated.
    assert_eq!(
        ctx.config.snapshot().get_u64("#r", "idle_chat_interval", 0),
        60
    );
    assert!(!ctx.is_admin("alice"));

    // Workers resumed: the router still processes traffic.
    assert!(!ctx.pause.is_paused());
    feed(&ctx, &[":alice!a@h PRIVMSG #r :Quip: still with us?"]).await;
    settle().await;
    assert_eq!(drain(&mut rx), vec!["PRIVMSG #r :ok"]);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_and_old_config_stays() {
    let (ctx, _rx) = new_context(json!({"idle_chat_interval": 300}), "ok");

    let mut bad = config_with(json!({}));
    bad.servers.clear();
    let result = reload::apply(&ctx, bad, false).await;
    assert!(matches!(result, Err(BotError::Config(_))));

    assert_eq!(
        ctx.config
            .snapshot()
            .get_u64("#banter", "idle_chat_interval", 0),
        300
    );
    assert!(!ctx.pause.is_paused());
}

#[tokio::test(start_paused = true)]
async fn rehash_requires_config_source() {
    let (ctx, _rx) = new_context(json!({}), "ok");
    let result = reload::rehash(&ctx).await;
    assert!(matches!(result, Err(BotError::NoConfigSource)));
}

#[tokio::test(start_paused = true)]
async fn rehash_pulls_from_registered_source() {
    let (ctx, _rx) = new_context(json!({}), "ok");
    ctx.set_config_source(Box::new(|| {
        Ok(serde_json::from_value(merged_config(json!({"cmd_prefix": "."})))
            .expect("valid config"))
    }));

    reload::rehash(&ctx).await.unwrap();
    assert_eq!(ctx.config.snapshot().cmd_prefix("#banter"), ".");
}

#[tokio::test(start_paused = true)]
async fn reload_times_out_when_a_worker_never_yields() {
    let (ctx, _rx) = new_context(json!({}), "ok");
    let busy = ctx.pause.enter();

    let result = reload::apply(&ctx, config_with(json!({})), false).await;
    assert!(matches!(result, Err(BotError::ReloadTimeout)));
    assert!(!ctx.pause.is_paused());
    drop(busy);
}

#[tokio::test(start_paused = true)]
async fn usermode_change_reapplied_when_registered() {
    let (ctx, mut rx) = new_context(json!({"usermode": "+i"}), "ok");
    feed(&ctx, &[":srv 001 Quip :welcome"]).await;
    drain(&mut rx);

    reload::apply(&ctx, config_with(json!({"usermode": "+ix"})), false)
        .await
        .unwrap();
    assert_eq!(drain(&mut rx), vec!["MODE Quip +ix"]);

    // Unchanged usermode is not re-sent.
    reload::apply(&ctx, config_with(json!({"usermode": "+ix"})), false)
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_action_clocks_reset_under_new_intervals() {
    let (ctx, _rx) = new_context(
        json!({"idle_chat_interval": 600, "channels": [{"name": "#r"}]}),
        "ok",
    );
    feed(&ctx, &[":Quip!quip@bot.host JOIN :#r"]).await;
    let stale = Instant::now() - Duration::from_secs(2);
    ctx.timers.lock().unwrap().touch_chat("#r", stale);

    // The new, shorter interval makes the old clock instantly due; the
    // reload resets it instead of firing a burst.
    reload::apply(
        &ctx,
        config_with(json!({"idle_chat_interval": 1, "channels": [{"name": "#r"}]})),
        false,
    )
    .await
    .unwrap();

    let last_chat = ctx.timers.lock().unwrap().last_chat("#r").unwrap();
    assert!(last_chat > stale);
}
