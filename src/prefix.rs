//! IRC message prefix (source) handling.
//!
//! A prefix identifies where a message came from: either a server name or a
//! user in `nick!user@host` form. The user and host portions are optional on
//! the wire, so they are modeled as `Option`s here.

use std::fmt;

/// The source of an IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prefix {
    /// Nickname, or the server name for server-originated messages.
    pub nick: String,
    /// Ident / username portion, if present.
    pub user: Option<String>,
    /// Hostname portion, if present.
    pub host: Option<String>,
}

impl Prefix {
    /// Parse a raw prefix string (without the leading `:`).
    ///
    /// Splits on `!` and `@`: `nick!user@host`, `nick@host`, or a bare
    /// name. A bare name containing `.` is typically a server.
    pub fn parse(raw: &str) -> Self {
        let (nick, rest) = match raw.split_once('!') {
            Some((n, r)) => (n, Some(r)),
            None => (raw, None),
        };
        match rest {
            Some(rest) => match rest.split_once('@') {
                Some((user, host)) => Prefix {
                    nick: nick.to_string(),
                    user: Some(user.to_string()),
                    host: Some(host.to_string()),
                },
                None => Prefix {
                    nick: nick.to_string(),
                    user: Some(rest.to_string()),
                    host: None,
                },
            },
            None => match nick.split_once('@') {
                Some((n, host)) => Prefix {
                    nick: n.to_string(),
                    user: None,
                    host: Some(host.to_string()),
                },
                None => Prefix {
                    nick: nick.to_string(),
                    user: None,
                    host: None,
                },
            },
        }
    }

    /// Whether this prefix names a server rather than a user.
    pub fn is_server(&self) -> bool {
        self.user.is_none() && self.host.is_none() && self.nick.contains('.')
    }

    /// The `user@host` portion, when both parts are known.
    pub fn userhost(&self) -> Option<String> {
        match (&self.user, &self.host) {
            (Some(u), Some(h)) => Some(format!("{}@{}", u, h)),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}
