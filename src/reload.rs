//! Hot reconfiguration: pause, swap, resume.
//!
//! One mutex serializes reloads. Phase 1 raises the pause gate and waits
//! for every worker to reach an idle point; phase 2 swaps the settings
//! handle and dependent subsystems (admin patterns, rate limiter, command
//! registry), reverting to the pre-swap snapshot on failure; phase 3 drops
//! the gate and resets clocks that are stale under the new intervals.
//! Sockets, roster, chat log, and flood tables stay untouched throughout.
//!
//! Code hot-swapping is deliberately not a thing here: the command table
//! is rebuilt from the compile-time registry, and a config-only rehash is
//! the same operation minus the rebuild.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bot::Context;
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::error::{BotError, Result};

/// How long the controller waits for workers to reach an idle point.
pub const PAUSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback a driver registers to produce fresh configuration on reload.
pub type ConfigSource = Box<dyn Fn() -> Result<Config> + Send + Sync>;

/// Cooperative pause gate observed by every worker loop.
///
/// Workers call [`PauseGate::wait_resumed`] at their yield points and hold
/// a [`BusyGuard`] while doing work; the controller raises the gate and
/// waits for the busy count to drain.
#[derive(Debug)]
pub struct PauseGate {
    paused: watch::Sender<bool>,
    busy: AtomicUsize,
}

impl PauseGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        PauseGate {
            paused,
            busy: AtomicUsize::new(0),
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Block while the gate is raised.
    pub async fn wait_resumed(&self) {
        if !self.is_paused() {
            return;
        }
        let mut rx = self.paused.subscribe();
        loop {
            if !*rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Mark this worker busy until the guard drops.
    pub fn enter(&self) -> BusyGuard<'_> {
        self.busy.fetch_add(1, Ordering::SeqCst);
        BusyGuard(self)
    }

    /// Raise the gate and wait for workers to drain, bounded by `timeout`.
    /// On timeout the gate is dropped again and an error returned.
    pub(crate) async fn pause(&self, timeout: Duration) -> Result<()> {
        self.paused.send_replace(true);
        let deadline = tokio::time::Instant::now() + timeout;
        while self.busy.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                self.paused.send_replace(false);
                return Err(BotError::ReloadTimeout);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    pub(crate) fn resume(&self) {
        self.paused.send_replace(false);
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        PauseGate::new()
    }
}

/// RAII busy marker; see [`PauseGate::enter`].
pub struct BusyGuard<'a>(&'a PauseGate);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config-only rehash through the registered source.
pub async fn rehash(ctx: &Arc<Context>) -> Result<()> {
    let _guard = ctx.reload_lock.lock().await;
    let new_config = fetch_config(ctx)?;
    run_reload(ctx, new_config, false).await
}

/// Full reload through the registered source: configuration plus a
/// command-registry rebuild.
pub async fn full_reload(ctx: &Arc<Context>) -> Result<()> {
    let _guard = ctx.reload_lock.lock().await;
    let new_config = fetch_config(ctx)?;
    run_reload(ctx, new_config, true).await
}

/// Apply an already-loaded configuration (drivers and tests that do their
/// own loading).
pub async fn apply(ctx: &Arc<Context>, config: Config, rebuild_commands: bool) -> Result<()> {
    let _guard = ctx.reload_lock.lock().await;
    run_reload(ctx, config, rebuild_commands).await
}

fn fetch_config(ctx: &Arc<Context>) -> Result<Config> {
    let source = ctx.config_source.lock().unwrap();
    match source.as_ref() {
        Some(load) => load(),
        None => Err(BotError::NoConfigSource),
    }
}

async fn run_reload(ctx: &Arc<Context>, new_config: Config, rebuild_commands: bool) -> Result<()> {
    new_config.validate()?;
    info!(rebuild_commands, "reload: pausing workers");
    ctx.pause.pause(PAUSE_TIMEOUT).await?;

    let usermode_before = ctx.config.snapshot().config().usermode.clone();
    let previous = ctx.config.replace(new_config);

    let result = swap_subsystems(ctx, rebuild_commands);
    if let Err(e) = result {
        warn!("reload failed, reverting: {}", e);
        ctx.config.restore(previous);
        let settings = ctx.config.snapshot();
        ctx.access.update_patterns(&settings.config().admins);
        ctx.bucket.reconfigure(
            settings.config().irc_burst_size,
            settings.config().irc_fill_rate,
        );
        ctx.pause.resume();
        return Err(e);
    }

    // Re-apply usermode when it changed and we are registered.
    let settings = ctx.config.snapshot();
    let usermode_after = settings.config().usermode.clone();
    if usermode_after != usermode_before {
        if let Some(mode) = usermode_after.as_deref().filter(|m| !m.is_empty()) {
            if ctx.session.lock().unwrap().registered() {
                let nick = ctx.current_nick();
                info!(usermode = mode, "applying new user mode");
                ctx.writer.send_raw(format!("MODE {} {}", nick, mode));
            }
        }
    }

    reset_stale_timers(ctx);
    ctx.pause.resume();
    info!("reload complete");
    Ok(())
}

fn swap_subsystems(ctx: &Arc<Context>, rebuild_commands: bool) -> Result<()> {
    let settings = ctx.config.snapshot();
    ctx.access.update_patterns(&settings.config().admins);
    ctx.bucket.reconfigure(
        settings.config().irc_burst_size,
        settings.config().irc_fill_rate,
    );

    if rebuild_commands {
        let registry = CommandRegistry::new();
        if registry.is_empty() {
            return Err(BotError::Config("command registry came up empty".into()));
        }
        let count = registry.len();
        *ctx.commands.write().unwrap() = registry;
        info!(count, "command registry rebuilt");
    }
    Ok(())
}

/// Reset idle/action clocks that are already past their (possibly new)
/// intervals, so a shortened interval does not fire a burst immediately.
fn reset_stale_timers(ctx: &Arc<Context>) {
    let settings = ctx.config.snapshot();
    let now = Instant::now();
    let mut timers = ctx.timers.lock().unwrap();
    for channel in settings.channels() {
        let room = channel.name.as_str();
        let idle_interval = settings.get_u64(room, "idle_chat_interval", 0);
        if idle_interval > 0 {
            let last = timers.last_chat(room).unwrap_or(now);
            if now.saturating_duration_since(last) >= Duration::from_secs(idle_interval) {
                debug!(room, "resetting stale idle-chat clock");
                timers.touch_chat(room, now);
            }
        }
        let action_interval = settings.get_u64(room, "random_action_interval", 0);
        if action_interval > 0 {
            let last = timers.last_action(room).unwrap_or(now);
            if now.saturating_duration_since(last) >= Duration::from_secs(action_interval) {
                debug!(room, "resetting stale random-action clock");
                timers.touch_action(room, now);
            }
        }
    }
}

/// Driver-facing handle for reload operations (wire it to SIGHUP/SIGUSR1
/// or an admin surface).
#[derive(Clone)]
pub struct ReloadHandle {
    ctx: Arc<Context>,
}

impl ReloadHandle {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        ReloadHandle { ctx }
    }

    /// Config-only rehash (SIGHUP equivalent).
    pub async fn rehash(&self) -> Result<()> {
        rehash(&self.ctx).await
    }

    /// Full reload including the command-table rebuild (SIGUSR1
    /// equivalent).
    pub async fn reload(&self) -> Result<()> {
        full_reload(&self.ctx).await
    }
}
