//! # banter
//!
//! A resident AI chat agent for IRC: it keeps presence in a configured set
//! of channels, watches the conversation, and speaks through an external
//! LLM service — with a hand-rolled protocol codec, SASL-capable
//! registration, per-channel scheduling (idle chat, random moderator
//! actions, continuation speech), flood protection, and hot
//! reconfiguration over a live socket.
//!
//! ## Features
//!
//! - Line codec with byte-identical round-trips and RFC 1459 casemapping
//! - Connection rotation with TLS, source binding, and fixed back-off
//! - Registration state machine: CAP negotiation, SASL PLAIN, nickname
//!   collision recovery, WHOX roster sync
//! - Token-bucket-governed outbound writer
//! - Per-channel scheduler with runtime-mutable parameters
//! - Sliding-window flood protection with timed bans and ignores
//! - Config rehash and full reload without dropping the socket
//!
//! ## Quick start
//!
//! The driver loads configuration in whatever format it likes,
//! deserializes it into [`Config`], and hands it to [`Bot`] together with
//! an LLM implementation:
//!
//! ```no_run
//! use std::sync::Arc;
//! use banter::{Bot, Config, OpenAiChat};
//!
//! # async fn demo() -> banter::Result<()> {
//! let config: Config = serde_json::from_str(r#"{
//!     "nick": "Quip",
//!     "ident": "quip",
//!     "realname": "Quip Bot",
//!     "servers": [{"host": "irc.example.net", "port": 6697, "tls": true}],
//!     "channels": [{"name": "#banter"}]
//! }"#).expect("valid config");
//!
//! let bot = Bot::new(config, Arc::new(OpenAiChat::new()))?;
//! bot.run().await
//! # }
//! ```

#![deny(clippy::all)]

pub mod access;
pub mod bot;
pub mod casemap;
pub mod commands;
pub mod config;
pub mod connector;
pub mod error;
pub mod flood;
pub mod format;
pub mod history;
pub mod llm;
pub mod message;
pub mod prefix;
pub mod ratelimit;
pub mod reload;
pub mod reply;
pub mod roster;
pub mod router;
pub mod sasl;
pub mod scheduler;
pub mod state;
pub mod transport;

pub use self::access::{authorize, AccessControl, Requires};
pub use self::bot::{Bot, Context, WriterHandle};
pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::commands::{Command, CommandRegistry, Reply};
pub use self::config::{ChannelConfig, Config, ServerConfig, Settings, SharedConfig};
pub use self::error::{BotError, LlmError, MessageParseError, Result};
pub use self::flood::{ChannelWindow, FloodGuard, FloodVerdict, PrivateWindow};
pub use self::history::ChatLog;
pub use self::llm::{Llm, LlmRequest, OpenAiChat};
pub use self::message::{is_channel_name, Message};
pub use self::prefix::Prefix;
pub use self::ratelimit::TokenBucket;
pub use self::reload::ReloadHandle;
pub use self::roster::{Member, MemberFlags, Roster, UserInfo};
pub use self::state::{ConnectionState, RoomTimers, Session};
pub use self::transport::{TransportReader, TransportWriter};
