//! The resident bot: shared context, outbound writer, and the run loop.
//!
//! [`Context`] owns every piece of shared state and is handed (as an `Arc`)
//! to the router, scheduler, watchdog, and command handlers. All outbound
//! traffic funnels through the [`WriterHandle`] queue and is drained by the
//! connection loop under the token bucket, so chunk order is preserved and
//! no producer can bypass rate limiting.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::access::AccessControl;
use crate::casemap::irc_eq;
use crate::commands::CommandRegistry;
use crate::config::{Config, ServerConfig, SharedConfig};
use crate::connector::{Connector, RECONNECT_DELAY};
use crate::error::{BotError, Result};
use crate::flood::FloodGuard;
use crate::format;
use crate::history::ChatLog;
use crate::llm::Llm;
use crate::message::Message;
use crate::ratelimit::TokenBucket;
use crate::reload::{ConfigSource, PauseGate, ReloadHandle};
use crate::roster::Roster;
use crate::router;
use crate::scheduler;
use crate::state::{ConnectionState, RoomTimers, Session};
use crate::transport::{TransportReadError, TransportReader, TransportWriter};

/// Cloneable producer side of the outbound queue.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl WriterHandle {
    /// Enqueue a protocol message.
    pub fn send(&self, msg: Message) {
        self.send_raw(msg.to_string());
    }

    /// Enqueue a raw line (no CRLF).
    pub fn send_raw(&self, line: impl Into<String>) {
        // A closed queue means shutdown is already underway.
        let _ = self.tx.send(line.into());
    }
}

/// Shared state for every task and handler.
pub struct Context {
    pub config: SharedConfig,
    pub writer: WriterHandle,
    pub llm: Arc<dyn Llm>,
    pub roster: Mutex<Roster>,
    pub history: ChatLog,
    pub flood: FloodGuard,
    pub access: AccessControl,
    pub session: Mutex<Session>,
    pub timers: Mutex<RoomTimers>,
    pub commands: RwLock<CommandRegistry>,
    pub bucket: TokenBucket,
    pub pause: PauseGate,
    pub(crate) reload_lock: tokio::sync::Mutex<()>,
    pub(crate) config_source: Mutex<Option<ConfigSource>>,
    running: watch::Sender<bool>,
    pub(crate) started: Instant,
}

impl Context {
    /// Build a context from a validated configuration.
    ///
    /// Returns the context plus the consumer side of the outbound queue;
    /// [`Bot::run`] drains it through the transport, and tests drain it
    /// directly to observe protocol output.
    pub fn new(
        config: Config,
        llm: Arc<dyn Llm>,
    ) -> Result<(Arc<Context>, mpsc::UnboundedReceiver<String>)> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (running, _) = watch::channel(true);
        let access = AccessControl::new(&config.admins);
        let bucket = TokenBucket::new(config.irc_burst_size, config.irc_fill_rate);
        let session = Session::new(&config.nick);
        let ctx = Arc::new(Context {
            config: SharedConfig::new(config),
            writer: WriterHandle { tx },
            llm,
            roster: Mutex::new(Roster::new()),
            history: ChatLog::new(),
            flood: FloodGuard::new(),
            access,
            session: Mutex::new(session),
            timers: Mutex::new(RoomTimers::new()),
            commands: RwLock::new(CommandRegistry::new()),
            bucket,
            pause: PauseGate::new(),
            reload_lock: tokio::sync::Mutex::new(()),
            config_source: Mutex::new(None),
            running,
            started: Instant::now(),
        });
        Ok((ctx, rx))
    }

    /// The nickname currently held on the network.
    pub fn current_nick(&self) -> String {
        self.session.lock().unwrap().current_nick.clone()
    }

    /// Flip the run flag; every loop exits at its next yield point.
    pub fn stop(&self) {
        self.running.send_replace(false);
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// A watch receiver that wakes when the run flag flips.
    pub fn running_watch(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Register the callback a reload uses to obtain fresh configuration.
    pub fn set_config_source(&self, source: ConfigSource) {
        *self.config_source.lock().unwrap() = Some(source);
    }

    /// Whether an identity is a bot admin, resolving userhost and account
    /// from the roster.
    pub fn is_admin(&self, nick: &str) -> bool {
        let (userhost, account) = {
            let roster = self.roster.lock().unwrap();
            match roster.user(nick) {
                Some(user) => (user.userhost(), user.account.clone()),
                None => (None, None),
            }
        };
        self.access.is_admin(
            nick,
            userhost.as_deref(),
            account.as_deref(),
            Instant::now(),
        )
    }

    /// Whether a user may not be kicked: the bot itself, room ops, admins.
    pub fn is_protected_user(&self, room: &str, nick: &str) -> bool {
        if irc_eq(nick, &self.current_nick()) {
            return true;
        }
        if self.roster.lock().unwrap().member_flags(room, nick).op {
            return true;
        }
        self.is_admin(nick)
    }

    /// Whether the bot was the most recent speaker in a room's chat log.
    pub fn was_last_speaker(&self, room: &str) -> bool {
        self.history
            .last_speaker(room)
            .map_or(false, |speaker| irc_eq(&speaker, &self.current_nick()))
    }

    /// Post to a room: normalize, chunk to the line limit, enqueue each
    /// chunk, and update the self-speech clocks.
    pub fn send_channel_message(&self, room: &str, text: &str, add_to_history: bool) {
        let settings = self.config.snapshot();
        let formatted = format::markdown_to_irc(text);
        let nick = self.current_nick();
        let capacity = settings.chat_history(room);

        for chunk in format::split_message(&formatted, room) {
            self.writer.send(Message::privmsg(room, &chunk));
            if add_to_history {
                self.history.append(room, &nick, &chunk, capacity);
            }
        }

        let now = Instant::now();
        let mut timers = self.timers.lock().unwrap();
        timers.touch_bot(room, now);
        // Speaking keeps the continuation cadence while a trigger window
        // is active.
        if scheduler::continuation_active(&settings, &timers, room, now) {
            let freq = settings.get_u64(room, "ai_continue_freq", 30);
            timers.set_continuation(room, now + Duration::from_secs(freq));
        }
    }

    /// Enqueue the registration dialog for a fresh connection.
    pub fn send_registration(&self, server: &ServerConfig) {
        let settings = self.config.snapshot();
        let cfg = settings.config();
        self.session.lock().unwrap().begin_registration();

        if cfg.sasl.enabled {
            self.writer.send_raw("CAP LS 302");
        }
        if let Some(password) = server.password.as_deref().filter(|p| !p.is_empty()) {
            self.writer.send_raw(format!("PASS {}", password));
        }
        let nick = self.current_nick();
        self.writer.send_raw(format!("NICK {}", nick));
        self.writer
            .send_raw(format!("USER {} 0 * :{}", cfg.ident, cfg.realname));
        if !cfg.sasl.enabled {
            self.writer.send_raw("CAP END");
        }
    }
}

/// The resident client.
pub struct Bot {
    ctx: Arc<Context>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Bot {
    pub fn new(config: Config, llm: Arc<dyn Llm>) -> Result<Self> {
        let (ctx, outbound) = Context::new(config, llm)?;
        Ok(Bot { ctx, outbound })
    }

    /// Shared context, for drivers that wire up signals or inspection.
    pub fn context(&self) -> Arc<Context> {
        self.ctx.clone()
    }

    /// Handle for config-only rehash and full reload.
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle::new(self.ctx.clone())
    }

    /// Connect, converse, reconnect. Returns after an orderly shutdown.
    pub async fn run(mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let scheduler_task = tokio::spawn(scheduler::scheduler_loop(ctx.clone()));
        let watchdog_task = tokio::spawn(scheduler::watchdog_loop(ctx.clone()));

        let mut connector = {
            let settings = ctx.config.snapshot();
            Connector::new(
                settings.config().servers.clone(),
                settings.config().bindhost.clone(),
            )
        };
        let mut last_servers = ctx.config.snapshot().config().servers.clone();
        let mut running = ctx.running_watch();

        while ctx.is_running() {
            {
                // Pick up reloaded server lists without disturbing rotation
                // otherwise.
                let settings = ctx.config.snapshot();
                if settings.config().servers != last_servers {
                    last_servers = settings.config().servers.clone();
                    connector.update(
                        settings.config().servers.clone(),
                        settings.config().bindhost.clone(),
                    );
                }
            }

            ctx.session.lock().unwrap().state = ConnectionState::Connecting;
            let (server, mut reader, writer) = tokio::select! {
                pair = connector.connect() => pair,
                _ = running.changed() => break,
            };

            ctx.send_registration(&server);
            match connection_loop(&ctx, &mut reader, writer, &mut self.outbound).await {
                Ok(()) => break,
                Err(e) => {
                    warn!("connection lost: {}", e);
                    ctx.session.lock().unwrap().state = ConnectionState::Disconnected;
                    connector.rotate();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }

        ctx.stop();
        let _ = scheduler_task.await;
        let _ = watchdog_task.await;
        info!("bot shutdown complete");
        Ok(())
    }
}

async fn connection_loop(
    ctx: &Arc<Context>,
    reader: &mut TransportReader,
    mut writer: TransportWriter,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    let mut running = ctx.running_watch();
    loop {
        // Reload pause point: between lines, before blocking I/O.
        ctx.pause.wait_resumed().await;

        tokio::select! {
            result = reader.read_line() => match result {
                Ok(Some(line)) => {
                    let _busy = ctx.pause.enter();
                    router::handle_line(ctx, &line).await;
                }
                Ok(None) => return Err(BotError::Disconnected),
                Err(TransportReadError::Io(e)) => return Err(e.into()),
                Err(TransportReadError::LineTooLong { preview }) => {
                    warn!(preview = %preview, "dropping overlong inbound line");
                }
                Err(TransportReadError::IllegalControlChar { ch, preview }) => {
                    warn!(ch = ?ch, preview = %preview, "dropping inbound line with control character");
                }
            },
            queued = outbound.recv() => match queued {
                Some(line) => write_limited(ctx, &mut writer, &line).await?,
                None => return Err(BotError::WriterClosed),
            },
            _ = running.changed() => {
                if !ctx.is_running() {
                    // Flush what is already queued (the QUIT, typically).
                    while let Ok(line) = outbound.try_recv() {
                        write_limited(ctx, &mut writer, &line).await?;
                    }
                    return Ok(());
                }
            }
        }
    }
}

async fn write_limited(
    ctx: &Arc<Context>,
    writer: &mut TransportWriter,
    line: &str,
) -> Result<()> {
    let wait = ctx.bucket.acquire(Instant::now());
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
    writer.write_line(line).await?;
    Ok(())
}
