//! Access control: admin identification and command authorization.
//!
//! Admin identity is an ordered list of patterns: a plain word (matched
//! against nick or services account), or an IRC wildcard mask matched
//! against `nick!ident@host`. Wildcards compile to anchored regexes with
//! `*` as non-greedy `.*?` and `?` as `.`. Results are memoized for 60
//! seconds per `(nick, userhost)` pair; the cache is dropped on reload.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error};

use crate::casemap::{irc_eq, irc_to_lower};

/// How long a memoized admin decision stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Permission level a command requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requires {
    /// Anyone may use the command.
    #[default]
    Any,
    /// Voice or op in the room.
    Voice,
    /// Op in the room.
    Op,
    /// Bot administrators only.
    Admin,
}

/// Decide whether a user clears a required level.
///
/// Admins bypass everything; `admin` denies everyone else; `op` needs the
/// per-room op flag; `voice` accepts voice or op.
pub fn authorize(required: Requires, is_admin: bool, is_op: bool, is_voice: bool) -> bool {
    if is_admin {
        return true;
    }
    match required {
        Requires::Any => true,
        Requires::Voice => is_voice || is_op,
        Requires::Op => is_op,
        Requires::Admin => false,
    }
}

#[derive(Debug)]
enum Pattern {
    /// Exact nick or services-account match.
    Word(String),
    /// Compiled wildcard mask against `nick!ident@host`.
    Mask(Regex),
}

/// Translate an IRC wildcard mask into an anchored, case-insensitive regex.
fn mask_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*?"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    match Regex::new(&out) {
        Ok(re) => Some(re),
        Err(e) => {
            error!(pattern, "invalid admin mask: {}", e);
            None
        }
    }
}

/// Normalize a partial mask: `@host` alone gets `*!` prepended, `nick!user`
/// alone gets `@*` appended.
fn normalize_mask(pattern: &str) -> String {
    if pattern.contains('@') && !pattern.contains('!') {
        format!("*!{}", pattern)
    } else if pattern.contains('!') && !pattern.contains('@') {
        format!("{}@*", pattern)
    } else {
        pattern.to_string()
    }
}

/// Resolves identities to admin status with a short-lived memo cache.
#[derive(Debug, Default)]
pub struct AccessControl {
    patterns: Mutex<Vec<Pattern>>,
    cache: Mutex<HashMap<(String, String), (bool, Instant)>>,
}

impl AccessControl {
    pub fn new(admins: &[String]) -> Self {
        let ac = AccessControl::default();
        ac.update_patterns(admins);
        ac
    }

    /// Replace the pattern list and drop the memo cache (config reload).
    pub fn update_patterns(&self, admins: &[String]) {
        let compiled = admins
            .iter()
            .filter_map(|raw| {
                if raw.contains('!') || raw.contains('@') {
                    mask_to_regex(&normalize_mask(raw)).map(Pattern::Mask)
                } else {
                    Some(Pattern::Word(raw.clone()))
                }
            })
            .collect();
        *self.patterns.lock().unwrap() = compiled;
        self.cache.lock().unwrap().clear();
    }

    /// Whether `nick!userhost` (with optional services account) is an admin.
    pub fn is_admin(
        &self,
        nick: &str,
        userhost: Option<&str>,
        account: Option<&str>,
        now: Instant,
    ) -> bool {
        let Some(userhost) = userhost else {
            return false;
        };

        let key = (irc_to_lower(nick), userhost.to_ascii_lowercase());
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some((result, stamp)) = cache.get(&key).copied() {
                if now.saturating_duration_since(stamp) < CACHE_TTL {
                    return result;
                }
                cache.remove(&key);
            }
        }

        let full_mask = format!("{}!{}", nick, userhost);
        let result = {
            let patterns = self.patterns.lock().unwrap();
            patterns.iter().any(|p| match p {
                Pattern::Word(word) => {
                    irc_eq(nick, word)
                        || account.map_or(false, |acct| acct.eq_ignore_ascii_case(word))
                }
                Pattern::Mask(re) => re.is_match(&full_mask),
            })
        };
        if result {
            debug!(nick, userhost, "admin match");
        }

        self.cache.lock().unwrap().insert(key, (result, now));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ac(patterns: &[&str]) -> AccessControl {
        AccessControl::new(&patterns.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_nick_pattern() {
        let ac = ac(&["Empus"]);
        let now = Instant::now();
        assert!(ac.is_admin("empus", Some("ident@host"), None, now));
        assert!(!ac.is_admin("imposter", Some("ident@host"), None, now));
    }

    #[test]
    fn test_account_pattern() {
        let ac = ac(&["services-acct"]);
        let now = Instant::now();
        assert!(ac.is_admin("anything", Some("i@h"), Some("Services-Acct"), now));
        assert!(!ac.is_admin("anything", Some("i@h"), None, now));
    }

    #[test]
    fn test_mask_pattern() {
        let ac = ac(&["*!*@trusted.example.net"]);
        let now = Instant::now();
        assert!(ac.is_admin("who", Some("x@trusted.example.net"), None, now));
        assert!(!ac.is_admin("who", Some("x@evil.example.net"), None, now));
    }

    #[test]
    fn test_partial_mask_normalized() {
        let now = Instant::now();
        // Host-only pattern
        let ac1 = ac(&["@trusted.net"]);
        assert!(ac1.is_admin("any", Some("u@trusted.net"), None, now));
        // Nick!user-only pattern
        let ac2 = ac(&["boss!admin"]);
        assert!(ac2.is_admin("boss", Some("admin@anywhere"), None, now));
        assert!(!ac2.is_admin("boss", Some("other@anywhere"), None, now));
    }

    #[test]
    fn test_question_mark_wildcard() {
        let ac = ac(&["adm?n!*@*"]);
        let now = Instant::now();
        assert!(ac.is_admin("admin", Some("a@b"), None, now));
        assert!(ac.is_admin("admon", Some("a@b"), None, now));
        assert!(!ac.is_admin("admiin", Some("a@b"), None, now));
    }

    #[test]
    fn test_missing_userhost_denied() {
        let ac = ac(&["*!*@*"]);
        assert!(!ac.is_admin("any", None, None, Instant::now()));
    }

    #[test]
    fn test_cache_coherence_and_expiry() {
        let ac = ac(&["boss"]);
        let now = Instant::now();
        assert!(ac.is_admin("boss", Some("a@b"), None, now));
        // Same answer within the TTL even if patterns changed underneath...
        *ac.patterns.lock().unwrap() = Vec::new();
        assert!(ac.is_admin("boss", Some("a@b"), None, now + Duration::from_secs(30)));
        // ...but re-evaluated after expiry.
        assert!(!ac.is_admin("boss", Some("a@b"), None, now + Duration::from_secs(61)));
    }

    #[test]
    fn test_update_patterns_invalidates_cache() {
        let ac = ac(&["boss"]);
        let now = Instant::now();
        assert!(ac.is_admin("boss", Some("a@b"), None, now));
        ac.update_patterns(&[]);
        assert!(!ac.is_admin("boss", Some("a@b"), None, now));
    }

    #[test]
    fn test_authorize_levels() {
        assert!(authorize(Requires::Any, false, false, false));
        assert!(!authorize(Requires::Voice, false, false, false));
        assert!(authorize(Requires::Voice, false, false, true));
        assert!(authorize(Requires::Voice, false, true, false));
        assert!(!authorize(Requires::Op, false, false, true));
        assert!(authorize(Requires::Op, false, true, false));
        assert!(!authorize(Requires::Admin, false, true, true));
        assert!(authorize(Requires::Admin, true, false, false));
    }
}
