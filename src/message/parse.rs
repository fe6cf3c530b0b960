//! Nom-based parser for the inbound line grammar.

use nom::{bytes::complete::take_while1, IResult};

use super::Message;
use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// Parse the command name: alphabetic, or a numeric reply code.
fn command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

/// Parse parameters after the command: space-separated middles, then an
/// optional trailing introduced by ` :` which runs to end of line.
fn params(mut input: &str) -> (Vec<&str>, Option<&str>) {
    let mut middles = Vec::new();

    loop {
        // Skip separating spaces (tolerate runs of them).
        let trimmed = input.trim_start_matches(' ');
        if trimmed.is_empty() {
            return (middles, None);
        }
        if let Some(trailing) = trimmed.strip_prefix(':') {
            return (middles, Some(trailing));
        }
        let end = trimmed.find(' ').unwrap_or(trimmed.len());
        middles.push(&trimmed[..end]);
        input = &trimmed[end..];
    }
}

/// Parse a complete line (CRLF already stripped) into a [`Message`].
pub(super) fn message(line: &str) -> Result<Message, MessageParseError> {
    // A line opening with `:` carries the source up to the first space.
    let (rest, pfx) = match line.strip_prefix(':') {
        Some(after) => {
            let end = after.find(' ').unwrap_or(after.len());
            if end == 0 {
                return Err(MessageParseError::InvalidCommand);
            }
            (&after[end..], Some(Prefix::parse(&after[..end])))
        }
        None => (line, None),
    };
    let rest = rest.trim_start_matches(' ');

    let (rest, cmd) = command(rest)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| MessageParseError::InvalidCommand)?;

    let (middles, trailing) = params(rest);

    Ok(Message {
        prefix: pfx,
        command: cmd.to_string(),
        params: middles.into_iter().map(str::to_string).collect(),
        trailing: trailing.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_command_rejected() {
        assert!(message(":prefix.only").is_err());
        assert!(message(": ").is_err());
    }

    #[test]
    fn test_extra_spaces_tolerated() {
        let msg = message("PRIVMSG  #channel  :hi").unwrap();
        assert_eq!(msg.params, vec!["#channel"]);
        assert_eq!(msg.trailing.as_deref(), Some("hi"));
    }

    #[test]
    fn test_trailing_keeps_colons() {
        let msg = message("PRIVMSG #c :a :b :c").unwrap();
        assert_eq!(msg.trailing.as_deref(), Some("a :b :c"));
    }

    #[test]
    fn test_ctcp_payload_preserved() {
        let msg = message(":a!b@c PRIVMSG bot :\u{1}VERSION\u{1}").unwrap();
        assert_eq!(msg.trailing.as_deref(), Some("\u{1}VERSION\u{1}"));
    }
}
