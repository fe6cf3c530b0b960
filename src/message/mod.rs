//! IRC message model: parsing and serialization.
//!
//! A wire line is `[":" prefix SP] command SP params [":" trailing]`,
//! terminated by CRLF. Parsing and serialization round-trip byte-for-byte
//! for canonical lines, which is what the codec tests assert.

mod parse;

use std::fmt;
use std::str::FromStr;

use crate::error::{BotError, MessageParseError};
use crate::prefix::Prefix;

/// A parsed IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message source, when present.
    pub prefix: Option<Prefix>,
    /// Command name or three-digit numeric.
    pub command: String,
    /// Middle parameters (never contain spaces).
    pub params: Vec<String>,
    /// Trailing parameter (after ` :`), may contain spaces.
    pub trailing: Option<String>,
}

impl Message {
    /// Start a message with just a command name.
    pub fn new(command: impl Into<String>) -> Self {
        Message {
            prefix: None,
            command: command.into(),
            params: Vec::new(),
            trailing: None,
        }
    }

    /// Append a middle parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Set the trailing parameter.
    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("PRIVMSG").with_param(target).with_trailing(text)
    }

    /// `NOTICE <target> :<text>`
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("NOTICE").with_param(target).with_trailing(text)
    }

    /// `JOIN <channel> [key]`
    pub fn join(channel: impl Into<String>, key: Option<&str>) -> Self {
        let msg = Message::new("JOIN").with_param(channel);
        match key {
            Some(k) if !k.is_empty() => msg.with_param(k),
            _ => msg,
        }
    }

    /// `KICK <channel> <nick> :<reason>`
    pub fn kick(
        channel: impl Into<String>,
        nick: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Message::new("KICK")
            .with_param(channel)
            .with_param(nick)
            .with_trailing(reason)
    }

    /// `TOPIC <channel> :<topic>`
    pub fn topic(channel: impl Into<String>, topic: impl Into<String>) -> Self {
        Message::new("TOPIC").with_param(channel).with_trailing(topic)
    }

    /// `PONG :<payload>`
    pub fn pong(payload: impl Into<String>) -> Self {
        Message::new("PONG").with_trailing(payload)
    }

    /// Positional parameter accessor.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// The message body: the trailing parameter, or the last middle one.
    pub fn text(&self) -> Option<&str> {
        self.trailing
            .as_deref()
            .or_else(|| self.params.last().map(String::as_str))
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }
}

impl FromStr for Message {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(BotError::InvalidMessage {
                string: s.to_string(),
                cause: MessageParseError::EmptyMessage,
            });
        }
        parse::message(line).map_err(|cause| BotError::InvalidMessage {
            string: s.to_string(),
            cause,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{}", trailing)?;
        }
        Ok(())
    }
}

/// Whether a target name denotes a channel.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_command() {
        let msg: Message = "PING".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert!(msg.prefix.is_none());
        assert!(msg.params.is_empty());
        assert!(msg.trailing.is_none());
    }

    #[test]
    fn test_parse_command_with_trailing() {
        let msg: Message = "PRIVMSG #channel :Hello, world!".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#channel"]);
        assert_eq!(msg.trailing.as_deref(), Some("Hello, world!"));
    }

    #[test]
    fn test_parse_with_prefix() {
        let msg: Message = ":nick!user@host PRIVMSG #channel :Hello".parse().unwrap();
        let prefix = msg.prefix.unwrap();
        assert_eq!(prefix.nick, "nick");
        assert_eq!(prefix.user.as_deref(), Some("user"));
        assert_eq!(prefix.host.as_deref(), Some("host"));
    }

    #[test]
    fn test_parse_numeric() {
        let msg: Message = ":server 001 bot :Welcome".parse().unwrap();
        assert!(msg.is_numeric());
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["bot"]);
        assert_eq!(msg.trailing.as_deref(), Some("Welcome"));
    }

    #[test]
    fn test_parse_multiple_params() {
        let msg: Message = "USER guest 0 * :Real Name".parse().unwrap();
        assert_eq!(msg.params, vec!["guest", "0", "*"]);
        assert_eq!(msg.trailing.as_deref(), Some("Real Name"));
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg: Message = "PRIVMSG #channel :".parse().unwrap();
        assert_eq!(msg.trailing.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_crlf_stripped() {
        let msg: Message = "PING :server\r\n".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing.as_deref(), Some("server"));
    }

    #[test]
    fn test_serialize_round_trip() {
        for line in [
            "PING",
            "PRIVMSG #channel :Hello, world!",
            ":nick!user@host PRIVMSG #channel :Hello",
            ":server 001 bot :Welcome",
            "USER guest 0 * :Real Name",
            "JOIN #channel key",
            "PRIVMSG #channel :",
            "MODE #channel +ov alice bob",
        ] {
            let msg: Message = line.parse().unwrap();
            assert_eq!(msg.to_string(), line, "round trip failed for {:?}", line);
        }
    }

    #[test]
    fn test_constructors() {
        assert_eq!(
            Message::privmsg("#r", "hi").to_string(),
            "PRIVMSG #r :hi"
        );
        assert_eq!(
            Message::join("#r", Some("sekrit")).to_string(),
            "JOIN #r sekrit"
        );
        assert_eq!(Message::join("#r", None).to_string(), "JOIN #r");
        assert_eq!(
            Message::kick("#r", "x", "bye").to_string(),
            "KICK #r x :bye"
        );
        assert_eq!(Message::pong("srv").to_string(), "PONG :srv");
    }

    #[test]
    fn test_is_channel_name() {
        assert!(is_channel_name("#rust"));
        assert!(is_channel_name("&local"));
        assert!(!is_channel_name("alice"));
    }

    #[test]
    fn test_text_accessor() {
        let msg: Message = "PRIVMSG #c :hello there".parse().unwrap();
        assert_eq!(msg.text(), Some("hello there"));
        let msg: Message = "JOIN #c".parse().unwrap();
        assert_eq!(msg.text(), Some("#c"));
    }
}
