//! Per-room chat log.
//!
//! Bounded FIFO of `"<speaker>: <text>"` lines, one buffer per room, used to
//! build LLM context and to answer "who spoke recently". Room keys are
//! normalized with RFC 1459 lowercasing. Nothing here persists.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::casemap::{irc_eq, irc_to_lower};

/// Default number of retained lines per room (`chat_history`).
pub const DEFAULT_CAPACITY: usize = 20;

/// Per-room bounded chat history.
#[derive(Debug, Default)]
pub struct ChatLog {
    rooms: Mutex<HashMap<String, VecDeque<String>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        ChatLog::default()
    }

    /// Append `"<speaker>: <text>"` to a room, evicting oldest-first past
    /// `capacity`.
    pub fn append(&self, room: &str, speaker: &str, text: &str, capacity: usize) {
        let mut rooms = self.rooms.lock().unwrap();
        let log = rooms.entry(irc_to_lower(room)).or_default();
        log.push_back(format!("{}: {}", speaker, text));
        while log.len() > capacity.max(1) {
            log.pop_front();
        }
    }

    /// The most recent `n` lines, oldest first.
    pub fn tail(&self, room: &str, n: usize) -> Vec<String> {
        let rooms = self.rooms.lock().unwrap();
        match rooms.get(&irc_to_lower(room)) {
            Some(log) => log.iter().rev().take(n).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// The most recent line, if any.
    pub fn last(&self, room: &str) -> Option<String> {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(&irc_to_lower(room)).and_then(|log| log.back().cloned())
    }

    /// Speaker of the most recent line, if any.
    pub fn last_speaker(&self, room: &str) -> Option<String> {
        self.last(room)
            .and_then(|line| line.split_once(": ").map(|(nick, _)| nick.to_string()))
    }

    /// Speakers across the most recent `n` lines, deduplicated, most recent
    /// first.
    pub fn recent_speakers(&self, room: &str, n: usize) -> Vec<String> {
        let rooms = self.rooms.lock().unwrap();
        let mut speakers: Vec<String> = Vec::new();
        if let Some(log) = rooms.get(&irc_to_lower(room)) {
            for line in log.iter().rev().take(n) {
                if let Some((nick, _)) = line.split_once(": ") {
                    if !speakers.iter().any(|s| irc_eq(s, nick)) {
                        speakers.push(nick.to_string());
                    }
                }
            }
        }
        speakers
    }

    /// Number of retained lines for a room.
    pub fn len(&self, room: &str) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(&irc_to_lower(room)).map_or(0, VecDeque::len)
    }

    /// Whether a room has no retained lines.
    pub fn is_empty(&self, room: &str) -> bool {
        self.len(room) == 0
    }
}
