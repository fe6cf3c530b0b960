//! Configuration model and the override-resolving settings view.
//!
//! Identity, server, and SASL settings are typed; behavior settings live in
//! a key/value tree so every key can be overridden per channel. Lookup
//! order is channel override, then global, then the caller's default, with
//! dotted keys traversing nested objects. The live settings handle is an
//! `Arc` swapped atomically on reload; every reader takes a snapshot.
//!
//! The crate never loads files itself: the driver deserializes whatever
//! format it likes into [`Config`] and hands it over.

use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::access::Requires;
use crate::error::{BotError, Result};
use crate::flood::{ChannelWindow, PrivateWindow};
use crate::history;
use crate::ratelimit;

/// One server candidate in the rotation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Set to `false` to skip certificate and hostname verification.
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    #[serde(default)]
    pub password: Option<String>,
}

/// SASL PLAIN credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaslConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A channel the bot resides in, with its behavior overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Join key, when the channel has one.
    #[serde(default)]
    pub key: Option<String>,
    /// Per-channel behavior overrides; same keys as the global tree.
    #[serde(flatten)]
    pub overrides: Map<String, Value>,
}

/// Parsed configuration as handed over by the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub nick: String,
    #[serde(default)]
    pub altnick: Option<String>,
    pub ident: String,
    pub realname: String,
    pub servers: Vec<ServerConfig>,
    /// Local source address to bind before connecting.
    #[serde(default)]
    pub bindhost: Option<String>,
    /// User mode applied after registration (e.g. `+ix`).
    #[serde(default)]
    pub usermode: Option<String>,
    #[serde(default)]
    pub sasl: SaslConfig,
    /// Raw lines sent after the MOTD boundary; `$nick` is substituted.
    #[serde(default)]
    pub post_connect_commands: Vec<String>,
    /// Admin patterns: nick, account, or wildcard mask.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default = "default_burst")]
    pub irc_burst_size: u32,
    #[serde(default = "default_fill_rate")]
    pub irc_fill_rate: f64,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Global behavior keys (`cmd_prefix`, `ai_*`, `idle_chat_*`, ...).
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_burst() -> u32 {
    ratelimit::DEFAULT_BURST
}

fn default_fill_rate() -> f64 {
    ratelimit::DEFAULT_FILL_RATE
}

impl Config {
    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.nick.is_empty() {
            return Err(BotError::Config("nick must not be empty".into()));
        }
        if self.ident.is_empty() {
            return Err(BotError::Config("ident must not be empty".into()));
        }
        if self.servers.is_empty() {
            return Err(BotError::Config("at least one server is required".into()));
        }
        Ok(())
    }

    /// The fallback nick, defaulting to `<nick>_`.
    pub fn altnick(&self) -> String {
        self.altnick
            .clone()
            .unwrap_or_else(|| format!("{}_", self.nick))
    }
}

/// Per-command settings resolved from the `commands` tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub enabled: bool,
    pub requires: Requires,
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            enabled: true,
            requires: Requires::Any,
        }
    }
}

/// Enabled random moderator actions (`random_actions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomAction {
    Topic,
    Kick,
}

/// Resolve a dotted key against one tree.
fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn as_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_f64().map(|f| f as u64))
}

/// Read view over a [`Config`] with channel-override resolution.
#[derive(Debug)]
pub struct Settings {
    cfg: Config,
}

impl Settings {
    pub fn new(cfg: Config) -> Self {
        Settings { cfg }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The channel entry for `room`, case-insensitively.
    pub fn channel(&self, room: &str) -> Option<&ChannelConfig> {
        self.cfg
            .channels
            .iter()
            .find(|c| crate::casemap::irc_eq(&c.name, room))
    }

    /// All configured channels.
    pub fn channels(&self) -> &[ChannelConfig] {
        &self.cfg.channels
    }

    /// Resolve a (possibly dotted) key: channel override first, then global.
    pub fn get(&self, room: &str, key: &str) -> Option<&Value> {
        if let Some(chan) = self.channel(room) {
            if let Some(v) = lookup(&chan.overrides, key) {
                return Some(v);
            }
        }
        lookup(&self.cfg.profile, key)
    }

    /// Resolve a key without any channel context (global tree only).
    pub fn get_global(&self, key: &str) -> Option<&Value> {
        lookup(&self.cfg.profile, key)
    }

    pub fn get_bool(&self, room: &str, key: &str, default: bool) -> bool {
        self.get(room, key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_u64(&self, room: &str, key: &str, default: u64) -> u64 {
        self.get(room, key).and_then(as_u64).unwrap_or(default)
    }

    pub fn get_str(&self, room: &str, key: &str, default: &str) -> String {
        self.get(room, key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// A list-of-strings key; missing resolves to empty.
    pub fn get_list(&self, room: &str, key: &str) -> Vec<String> {
        self.get(room, key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Command prefix for a room (`cmd_prefix`, default `!`).
    pub fn cmd_prefix(&self, room: &str) -> String {
        self.get_str(room, "cmd_prefix", "!")
    }

    /// Chat-log capacity for a room (`chat_history`).
    pub fn chat_history(&self, room: &str) -> usize {
        self.get_u64(room, "chat_history", history::DEFAULT_CAPACITY as u64) as usize
    }

    /// Per-command settings. A command block defined on the channel shadows
    /// the global block entirely; there is no field-level merge.
    pub fn command_config(&self, room: &str, name: &str) -> CommandConfig {
        let channel_block = self
            .channel(room)
            .and_then(|c| lookup(&c.overrides, "commands"))
            .and_then(Value::as_object)
            .and_then(|cmds| cmds.get(name));
        let block = channel_block.or_else(|| {
            lookup(&self.cfg.profile, "commands")
                .and_then(Value::as_object)
                .and_then(|cmds| cmds.get(name))
        });
        block
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Channel flood window (`floodpro`), when configured for the room.
    pub fn channel_flood(&self, room: &str) -> Option<ChannelWindow> {
        self.get(room, "floodpro")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Private-message flood window (`privmsg_floodpro`).
    pub fn private_flood(&self) -> Option<PrivateWindow> {
        self.get_global("privmsg_floodpro")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Ignored nicks for a room: the union of the global and channel lists.
    pub fn ignore_nicks(&self, room: &str) -> Vec<String> {
        let mut nicks: Vec<String> = self
            .get_global("ignore_nicks")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(chan) = self.channel(room) {
            if let Some(extra) = lookup(&chan.overrides, "ignore_nicks").and_then(Value::as_array) {
                for nick in extra.iter().filter_map(Value::as_str) {
                    if !nicks.iter().any(|n| crate::casemap::irc_eq(n, nick)) {
                        nicks.push(nick.to_string());
                    }
                }
            }
        }
        nicks
    }

    /// Ignore-regex patterns for a room: union of global and channel lists.
    pub fn ignore_regex(&self, room: &str) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .get_global("ignore_regex")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(chan) = self.channel(room) {
            if let Some(extra) = lookup(&chan.overrides, "ignore_regex").and_then(Value::as_array) {
                for pat in extra.iter().filter_map(Value::as_str) {
                    if !patterns.iter().any(|p| p == pat) {
                        patterns.push(pat.to_string());
                    }
                }
            }
        }
        patterns
    }

    /// Reply delay range in seconds (`ai_delay`); a scalar means a fixed
    /// delay.
    pub fn delay_range(&self, room: &str) -> (f64, f64) {
        match self.get(room, "ai_delay") {
            Some(Value::Array(items)) if items.len() == 2 => {
                let min = items[0].as_f64().unwrap_or(0.0);
                let max = items[1].as_f64().unwrap_or(min);
                (min, max.max(min))
            }
            Some(v) => {
                let fixed = v.as_f64().unwrap_or(0.0);
                (fixed, fixed)
            }
            None => (0.0, 0.0),
        }
    }

    /// Enabled random actions for a room; both default on.
    pub fn random_actions(&self, room: &str) -> Vec<RandomAction> {
        let mut enabled = Vec::new();
        let tree = self.get(room, "random_actions").and_then(Value::as_object);
        let is_on = |key: &str| {
            tree.and_then(|t| t.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(true)
        };
        if is_on("topic") {
            enabled.push(RandomAction::Topic);
        }
        if is_on("kick") {
            enabled.push(RandomAction::Kick);
        }
        enabled
    }
}

/// Atomically swappable settings handle; readers snapshot per access.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl SharedConfig {
    pub fn new(cfg: Config) -> Self {
        SharedConfig {
            inner: Arc::new(RwLock::new(Arc::new(Settings::new(cfg)))),
        }
    }

    /// Current settings snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.inner.read().unwrap().clone()
    }

    /// Swap in a new configuration, returning the previous snapshot so a
    /// failed reload can be reverted.
    pub fn replace(&self, cfg: Config) -> Arc<Settings> {
        let mut guard = self.inner.write().unwrap();
        std::mem::replace(&mut *guard, Arc::new(Settings::new(cfg)))
    }

    /// Put a previous snapshot back (reload revert path).
    pub fn restore(&self, previous: Arc<Settings>) {
        *self.inner.write().unwrap() = previous;
    }
}
