//! Output text shaping: LLM markdown to IRC control codes, and splitting
//! long payloads at sentence boundaries under the 512-byte line limit.

/// IRC bold control code.
pub const BOLD: char = '\x02';
/// IRC underline control code.
pub const UNDERLINE: char = '\x1F';

/// Protocol line limit including command, target, and CRLF.
pub const MAX_LINE: usize = 512;

/// Normalize an LLM reply for IRC.
///
/// Collapses newlines to spaces, strips one pair of surrounding quotes when
/// the whole string is quoted, and converts `**bold**` / `_underline_`
/// markdown delimiters into IRC control codes.
pub fn markdown_to_irc(text: &str) -> String {
    let mut message = text
        .replace('\r', "")
        .split('\n')
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    if message.len() >= 2 && message.starts_with('"') && message.ends_with('"') {
        message = message[1..message.len() - 1].to_string();
    }

    message = message.replace("**", &BOLD.to_string());
    message.replace('_', &UNDERLINE.to_string())
}

/// Floor `limit` down to a UTF-8 character boundary of `s`.
fn floor_char_boundary(s: &str, limit: usize) -> usize {
    let mut end = limit.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Split a payload into chunks that fit `PRIVMSG <target> :<chunk>\r\n`
/// within the 512-byte line limit.
///
/// Prefers the sentence boundary (`. `, `! `, `? `) nearest the limit, then
/// a word boundary, then a hard cut.
pub fn split_message(text: &str, target: &str) -> Vec<String> {
    let overhead = "PRIVMSG".len() + target.len() + 4;
    let max_len = MAX_LINE.saturating_sub(overhead).max(1);

    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.len() <= max_len {
            chunks.push(rest.to_string());
            break;
        }

        let window_end = floor_char_boundary(rest, max_len);
        let window = &rest[..window_end];

        let mut split_at = 0;
        for punct in [". ", "! ", "? "] {
            if let Some(pos) = window.rfind(punct) {
                split_at = split_at.max(pos + punct.len());
            }
        }
        if split_at == 0 {
            if let Some(pos) = window.rfind(' ') {
                split_at = pos;
            }
        }
        if split_at == 0 {
            split_at = window_end;
        }

        chunks.push(rest[..split_at].trim_end().to_string());
        rest = rest[split_at..].trim_start();
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}
