//! Room membership and observed identity metadata.
//!
//! One global table of identities (populated from prefixes, JOIN, and
//! WHO/WHOX replies) plus per-room member maps with op/voice flags. All
//! keys are RFC 1459 lowercased; display forms are kept on the entries.

use std::collections::HashMap;

use crate::casemap::irc_to_lower;
use crate::prefix::Prefix;

/// Observed metadata for one identity.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    /// Display-form nick.
    pub nick: String,
    pub ident: Option<String>,
    pub host: Option<String>,
    pub ip: Option<String>,
    /// Services account; `None` when not logged in.
    pub account: Option<String>,
    pub realname: Option<String>,
    pub away: bool,
    pub oper: bool,
}

impl UserInfo {
    /// `ident@host` when both are known.
    pub fn userhost(&self) -> Option<String> {
        match (&self.ident, &self.host) {
            (Some(i), Some(h)) => Some(format!("{}@{}", i, h)),
            _ => None,
        }
    }
}

/// Per-room privilege flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberFlags {
    pub op: bool,
    pub voice: bool,
}

/// One room member.
#[derive(Debug, Clone)]
pub struct Member {
    /// Display-form nick.
    pub nick: String,
    pub flags: MemberFlags,
}

/// Membership and identity state.
#[derive(Debug, Default)]
pub struct Roster {
    users: HashMap<String, UserInfo>,
    rooms: HashMap<String, HashMap<String, Member>>,
}

impl Roster {
    pub fn new() -> Self {
        Roster::default()
    }

    /// Record ident/host seen in a message prefix.
    pub fn note_prefix(&mut self, prefix: &Prefix) {
        if prefix.is_server() || prefix.user.is_none() {
            return;
        }
        let entry = self
            .users
            .entry(irc_to_lower(&prefix.nick))
            .or_insert_with(|| UserInfo {
                nick: prefix.nick.clone(),
                ..UserInfo::default()
            });
        if entry.ident.is_none() {
            entry.ident = prefix.user.clone();
        }
        if entry.host.is_none() {
            entry.host = prefix.host.clone();
        }
    }

    /// Self joined: clear the room and insert self with flags cleared.
    pub fn reset_room(&mut self, room: &str, self_nick: &str) {
        let members = self.rooms.entry(irc_to_lower(room)).or_default();
        members.clear();
        members.insert(
            irc_to_lower(self_nick),
            Member {
                nick: self_nick.to_string(),
                flags: MemberFlags::default(),
            },
        );
    }

    /// Another identity joined a room we track.
    pub fn join(&mut self, room: &str, nick: &str) {
        if let Some(members) = self.rooms.get_mut(&irc_to_lower(room)) {
            members.insert(
                irc_to_lower(nick),
                Member {
                    nick: nick.to_string(),
                    flags: MemberFlags::default(),
                },
            );
        }
    }

    pub fn part(&mut self, room: &str, nick: &str) {
        if let Some(members) = self.rooms.get_mut(&irc_to_lower(room)) {
            members.remove(&irc_to_lower(nick));
        }
    }

    /// Self left (PART or KICK): drop the whole room entry.
    pub fn remove_room(&mut self, room: &str) {
        self.rooms.remove(&irc_to_lower(room));
    }

    /// Identity quit the network entirely.
    pub fn quit(&mut self, nick: &str) {
        let key = irc_to_lower(nick);
        for members in self.rooms.values_mut() {
            members.remove(&key);
        }
        self.users.remove(&key);
    }

    /// Nick change: carry user data and room entries over.
    pub fn rename(&mut self, old: &str, new: &str) {
        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);
        if let Some(mut info) = self.users.remove(&old_key) {
            info.nick = new.to_string();
            self.users.insert(new_key.clone(), info);
        }
        for members in self.rooms.values_mut() {
            if let Some(mut member) = members.remove(&old_key) {
                member.nick = new.to_string();
                members.insert(new_key.clone(), member);
            }
        }
    }

    /// Apply one NAMES (353) token, e.g. `@alice` or `+bob`.
    pub fn apply_names_token(&mut self, room: &str, token: &str) {
        let mut rest = token;
        let mut flags = MemberFlags::default();
        while let Some(c) = rest.chars().next() {
            match c {
                '@' => flags.op = true,
                '+' => flags.voice = true,
                '%' | '~' | '&' | '!' => {}
                _ => break,
            }
            rest = &rest[c.len_utf8()..];
        }
        if rest.is_empty() {
            return;
        }
        let members = self.rooms.entry(irc_to_lower(room)).or_default();
        members.insert(
            irc_to_lower(rest),
            Member {
                nick: rest.to_string(),
                flags,
            },
        );
    }

    /// Apply a classic WHO (352) reply.
    pub fn apply_who(
        &mut self,
        room: &str,
        ident: &str,
        host: &str,
        nick: &str,
        status: &str,
        realname: &str,
    ) {
        if let Some(members) = self.rooms.get_mut(&irc_to_lower(room)) {
            let member = members
                .entry(irc_to_lower(nick))
                .or_insert_with(|| Member {
                    nick: nick.to_string(),
                    flags: MemberFlags::default(),
                });
            member.flags.op = status.contains('@');
            member.flags.voice = status.contains('+');
        }

        let entry = self
            .users
            .entry(irc_to_lower(nick))
            .or_insert_with(|| UserInfo {
                nick: nick.to_string(),
                ..UserInfo::default()
            });
        entry.ident = Some(ident.to_string());
        entry.host = Some(host.to_string());
        entry.realname = Some(realname.to_string());
        entry.away = status.contains('G');
        entry.oper = status.contains('*');
    }

    /// Apply a WHOX (354) reply carrying full metadata. Account `"0"`
    /// means not logged in.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_whox(
        &mut self,
        ident: &str,
        host: &str,
        ip: &str,
        nick: &str,
        flags: &str,
        account: &str,
        realname: &str,
    ) {
        let entry = self
            .users
            .entry(irc_to_lower(nick))
            .or_insert_with(|| UserInfo {
                nick: nick.to_string(),
                ..UserInfo::default()
            });
        entry.ident = Some(ident.to_string());
        entry.host = Some(host.to_string());
        entry.ip = Some(ip.to_string());
        entry.account = match account {
            "0" => None,
            acct => Some(acct.to_string()),
        };
        entry.realname = Some(realname.to_string());
        entry.away = flags.contains('G');
        entry.oper = flags.contains('*');

        let key = irc_to_lower(nick);
        for members in self.rooms.values_mut() {
            if let Some(member) = members.get_mut(&key) {
                member.flags.op = flags.contains('@') || flags.contains('*');
                member.flags.voice = flags.contains('+');
            }
        }
    }

    /// Update a privilege flag from a channel MODE change.
    pub fn set_mode_flag(&mut self, room: &str, nick: &str, mode: char, adding: bool) {
        if let Some(members) = self.rooms.get_mut(&irc_to_lower(room)) {
            if let Some(member) = members.get_mut(&irc_to_lower(nick)) {
                match mode {
                    'o' => member.flags.op = adding,
                    'v' => member.flags.voice = adding,
                    _ => {}
                }
            }
        }
    }

    /// Whether the bot (as `self_nick`) is present in a room.
    pub fn is_joined(&self, room: &str, self_nick: &str) -> bool {
        self.rooms
            .get(&irc_to_lower(room))
            .map_or(false, |members| members.contains_key(&irc_to_lower(self_nick)))
    }

    pub fn contains(&self, room: &str, nick: &str) -> bool {
        self.rooms
            .get(&irc_to_lower(room))
            .map_or(false, |members| members.contains_key(&irc_to_lower(nick)))
    }

    /// Current members of a room.
    pub fn members(&self, room: &str) -> Vec<Member> {
        self.rooms
            .get(&irc_to_lower(room))
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn member_flags(&self, room: &str, nick: &str) -> MemberFlags {
        self.rooms
            .get(&irc_to_lower(room))
            .and_then(|members| members.get(&irc_to_lower(nick)))
            .map(|m| m.flags)
            .unwrap_or_default()
    }

    pub fn user(&self, nick: &str) -> Option<&UserInfo> {
        self.users.get(&irc_to_lower(nick))
    }

    /// Lowercased names of rooms currently tracked.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }
}
