//! SASL PLAIN credentials for the registration dialog.
//!
//! The bot authenticates with PLAIN only (RFC 4616). After `CAP REQ
//! :sasl` and `AUTHENTICATE PLAIN`, the credentials go out as one or more
//! `AUTHENTICATE <fragment>` lines; [`auth_fragments`] produces exactly
//! the arguments the registration path must send, including the bare `+`
//! terminator a boundary-sized payload requires.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Servers accept at most this many bytes per AUTHENTICATE argument.
pub const AUTH_FRAGMENT_LEN: usize = 400;

/// Encode PLAIN credentials for `AUTHENTICATE`.
///
/// The decoded payload is `authzid NUL authcid NUL password`; the bot
/// leaves the authorization identity empty and authenticates as
/// `username`.
pub fn encode_plain(username: &str, password: &str) -> String {
    let mut payload = Vec::with_capacity(username.len() + password.len() + 2);
    payload.push(0);
    payload.extend_from_slice(username.as_bytes());
    payload.push(0);
    payload.extend_from_slice(password.as_bytes());
    BASE64.encode(payload)
}

/// Split an encoded payload into the AUTHENTICATE arguments to send, in
/// order.
///
/// Payloads longer than [`AUTH_FRAGMENT_LEN`] span several lines. When
/// the final fragment fills its line exactly (or the payload is empty),
/// the server cannot tell the response has ended, so a lone `+` closes
/// the exchange.
pub fn auth_fragments(encoded: &str) -> Vec<&str> {
    let mut fragments = Vec::with_capacity(encoded.len() / AUTH_FRAGMENT_LEN + 1);
    let mut rest = encoded;
    while rest.len() > AUTH_FRAGMENT_LEN {
        // base64 output is ASCII, so byte splits are char splits.
        let (line, tail) = rest.split_at(AUTH_FRAGMENT_LEN);
        fragments.push(line);
        rest = tail;
    }
    fragments.push(if rest.is_empty() { "+" } else { rest });
    if rest.len() == AUTH_FRAGMENT_LEN {
        fragments.push("+");
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_matches_rfc_4616_shape() {
        let decoded = BASE64.decode(encode_plain("quip", "hunter2")).unwrap();
        assert_eq!(decoded, b"\0quip\0hunter2");
    }

    #[test]
    fn short_credentials_fit_one_line() {
        let encoded = encode_plain("quip", "hunter2");
        assert!(encoded.len() < AUTH_FRAGMENT_LEN);
        assert_eq!(auth_fragments(&encoded), vec![encoded.as_str()]);
    }

    #[test]
    fn oversized_payload_spans_lines_in_order() {
        let encoded = encode_plain("quip", &"p".repeat(600));
        let fragments = auth_fragments(&encoded);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].len(), AUTH_FRAGMENT_LEN);
        assert_eq!(fragments.concat(), encoded);
    }

    #[test]
    fn boundary_sized_payload_is_terminated() {
        let encoded = "A".repeat(AUTH_FRAGMENT_LEN);
        assert_eq!(auth_fragments(&encoded), vec![encoded.as_str(), "+"]);
    }

    #[test]
    fn empty_payload_is_a_bare_plus() {
        assert_eq!(auth_fragments(""), vec!["+"]);
    }
}
